//! Domain-level error taxonomy for GenAI Flows.

use flows_adapters::AdapterError;
use flows_state::StorageError;

use crate::coordinator::CoordinatorError;
use crate::roles::RoleError;

/// Errors produced while running a flow.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("upstream service failed: {0}")]
    Adapter(#[from] AdapterError),

    #[error("routing error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("role configuration error: {0}")]
    Role(#[from] RoleError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("flow timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("turn budget of {max_turns} exhausted before all drafts were approved")]
    TurnBudgetExhausted { max_turns: usize },

    #[error("session stalled in state {state} with no pending directive")]
    Stalled { state: String },

    #[error("no agent registered for role {0}")]
    MissingAgent(String),

    #[error("search returned no results for: {query}")]
    NoResults { query: String },

    #[error("no {file_type} files could be downloaded")]
    NoDownloads { file_type: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("flow task was cancelled")]
    Cancelled,

    #[error("flow task panicked: {0}")]
    Panicked(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for flow operations.
pub type Result<T> = std::result::Result<T, FlowError>;
