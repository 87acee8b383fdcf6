//! Schema definitions for flows SurrealDB tables
//!
//! Tables:
//! - conversations: Saved document-flow conversations, one row per save

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{ConversationRecord, StoredMessage};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Conversation row as stored in the `conversations` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    /// Application record id (UUID string, unique)
    pub record_id: String,
    pub conversation_id: String,
    pub customer_id: String,
    pub messages: Vec<StoredMessage>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<ConversationRecord> for ConversationRow {
    fn from(record: ConversationRecord) -> Self {
        ConversationRow {
            id: None,
            record_id: record.id,
            conversation_id: record.conversation_id,
            customer_id: record.customer_id,
            messages: record.messages,
            created_at: record.created_at,
        }
    }
}

impl From<ConversationRow> for ConversationRecord {
    fn from(row: ConversationRow) -> Self {
        ConversationRecord {
            id: row.record_id,
            conversation_id: row.conversation_id,
            customer_id: row.customer_id,
            messages: row.messages,
            created_at: row.created_at,
        }
    }
}
