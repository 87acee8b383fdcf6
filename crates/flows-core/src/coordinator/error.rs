//! Error types for turn coordination.

/// Routing failures. The coordinator's state is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("message from unregistered role {0}")]
    UnknownRole(String),

    #[error("unexpected speaker {actual} in state {state}, expected {expected}")]
    UnexpectedSpeaker {
        state: String,
        expected: String,
        actual: String,
    },

    #[error("session already started")]
    AlreadyStarted,
}
