//! Error types for flows-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by [`crate::storage_traits::ConversationStore`] implementations
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend rejected or failed the operation
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A record failed validation before it was written
    #[error("invalid conversation record: {reason}")]
    InvalidRecord { reason: String },

    /// A digest string was not 64 hex characters
    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },

    /// A record with this id was already saved
    #[error("conversation record already exists: {id}")]
    Duplicate { id: String },
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}
