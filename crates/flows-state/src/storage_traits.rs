//! Storage trait definitions for conversation persistence
//!
//! - `ConversationStore`: append-only history of document-flow conversations,
//!   keyed by customer
//! - `ContentDigest`: SHA-256 naming for uploaded customer documents
//!
//! Traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Number of trailing messages returned by [`ConversationRecord::last_messages`].
pub const RECENT_MESSAGE_WINDOW: usize = 5;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private so the string is always lowercase hex produced
/// by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Conversation records
// ---------------------------------------------------------------------------

/// One message of a persisted conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// `user`, `assistant`, `system`, or a participant role
    pub role: String,
    /// Speaker name, when the message came from a named participant
    #[serde(default)]
    pub name: Option<String>,
    pub content: String,
}

impl StoredMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            name: None,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            name: None,
            content: content.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// True for the roles a customer-facing history shows.
    pub fn is_dialogue(&self) -> bool {
        matches!(self.role.as_str(), "user" | "assistant")
    }
}

/// A saved conversation for one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Unique record id (UUID string)
    pub id: String,
    /// Conversation the messages belong to; several records may share it
    pub conversation_id: String,
    pub customer_id: String,
    pub messages: Vec<StoredMessage>,
    pub created_at: DateTime<Utc>,
}

impl ConversationRecord {
    /// Create a record stamped with a fresh id and the current time.
    pub fn new(
        conversation_id: impl Into<String>,
        customer_id: impl Into<String>,
        messages: Vec<StoredMessage>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            customer_id: customer_id.into(),
            messages,
            created_at: Utc::now(),
        }
    }

    /// The last [`RECENT_MESSAGE_WINDOW`] messages, keeping only user and
    /// assistant turns.
    ///
    /// The window is applied before the role filter, so fewer than five
    /// messages may come back.
    pub fn last_messages(&self) -> Vec<StoredMessage> {
        let start = self.messages.len().saturating_sub(RECENT_MESSAGE_WINDOW);
        self.messages[start..]
            .iter()
            .filter(|m| m.is_dialogue())
            .cloned()
            .collect()
    }

    pub(crate) fn validate(&self) -> StorageResult<()> {
        if self.customer_id.trim().is_empty() {
            return Err(StorageError::InvalidRecord {
                reason: "customer_id is empty".to_string(),
            });
        }
        if self.conversation_id.trim().is_empty() {
            return Err(StorageError::InvalidRecord {
                reason: "conversation_id is empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Append-only store of conversation records.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a record. Saving the same `id` twice is `StorageError::Duplicate`.
    async fn save(&self, record: ConversationRecord) -> StorageResult<()>;

    /// Most recent record for a customer by `created_at`, if any.
    async fn latest_for_customer(
        &self,
        customer_id: &str,
    ) -> StorageResult<Option<ConversationRecord>>;

    /// All records for a customer, newest first.
    async fn list_for_customer(&self, customer_id: &str)
        -> StorageResult<Vec<ConversationRecord>>;
}
