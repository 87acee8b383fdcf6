//! Error types for the role registry.

/// Errors produced when a participant roster is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleError {
    #[error("duplicate role id: {id}")]
    DuplicateRole { id: String },

    #[error("registry needs exactly one {kind} role, found {found}")]
    WrongCount { kind: &'static str, found: usize },

    #[error("registry needs at least one producer role")]
    NoProducers,

    #[error("producer ordinals must be 0..{expected} in order, found {found:?}")]
    BadOrdinals { expected: usize, found: Vec<usize> },

    #[error("role id must not be empty")]
    EmptyId,
}

/// Result type for role registry operations.
pub type RoleResult<T> = std::result::Result<T, RoleError>;
