//! flows-state: SurrealDB backend for GenAI Flows
//!
//! Persists the conversations produced by the document flow so a customer's
//! recent history can be replayed into the next question.
//!
//! ## Layer 0 - Data/Persistence
//!
//! ## Key Components
//!
//! - `ConversationStore`: async storage trait, with a SurrealDB implementation
//!   and an in-memory fake
//! - `StoreConfig`: connection settings (`mem://`, `surrealkv://`, `ws(s)://`)
//! - `ContentDigest`: SHA-256 naming for uploaded documents

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{connect, Credentials, StoreConfig, DEFAULT_LOCAL_PATH};
pub use storage_traits::{
    ContentDigest, ConversationRecord, ConversationStore, StorageResult, StoredMessage,
    RECENT_MESSAGE_WINDOW,
};
pub use surreal_store::SurrealConversationStore;

/// Result type for flows-state operations
pub type Result<T> = std::result::Result<T, StateError>;
