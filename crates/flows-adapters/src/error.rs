//! Error types for flows-adapters

use thiserror::Error;

/// Errors raised by the external service clients
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Required configuration is missing
    #[error("{0} is not configured")]
    NotConfigured(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Service answered with a non-success status
    #[error("{service} returned {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Response body did not have the expected shape
    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },

    /// Service answered successfully with no usable content
    #[error("Empty response from {0}")]
    EmptyResponse(&'static str),

    /// A long-running operation ended in a failed state
    #[error("{service} operation {status}: {detail}")]
    OperationFailed {
        service: &'static str,
        status: String,
        detail: String,
    },

    /// Polling gave up before the operation finished
    #[error("{service} operation did not finish after {polls} polls")]
    PollExhausted { service: &'static str, polls: u32 },

    /// Named resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        AdapterError::Http(err.to_string())
    }
}

impl AdapterError {
    pub(crate) fn invalid(service: &'static str, reason: impl Into<String>) -> Self {
        AdapterError::InvalidResponse {
            service,
            reason: reason.into(),
        }
    }
}
