//! SurrealDB-backed ConversationStore implementation
//!
//! Uses `schema::ConversationRow` for persistence, converting to/from
//! `storage_traits::ConversationRecord` at the boundary.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::handle::{self, StoreConfig};
use crate::schema::ConversationRow;
use crate::storage_traits::{ConversationRecord, ConversationStore, StorageResult};

/// SurrealDB-backed implementation of [`ConversationStore`].
#[derive(Clone)]
pub struct SurrealConversationStore {
    db: Surreal<Any>,
}

impl SurrealConversationStore {
    /// Connect with explicit settings.
    pub async fn connect(config: &StoreConfig) -> crate::Result<Self> {
        let db = handle::connect(config).await?;
        Ok(Self { db })
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let store = Self::connect(&StoreConfig::in_memory()).await?;
        info!("SurrealConversationStore connected (in-memory)");
        Ok(store)
    }

    /// Create from environment variables, see [`StoreConfig::from_env`].
    pub async fn from_env() -> crate::Result<Self> {
        let config = StoreConfig::from_env();
        let store = Self::connect(&config).await?;
        info!(endpoint = %config.endpoint, "SurrealConversationStore connected");
        Ok(store)
    }

    async fn record_exists(&self, record_id: &str) -> StorageResult<bool> {
        let mut res = self
            .db
            .query("SELECT * FROM conversations WHERE record_id = $rid LIMIT 1")
            .bind(("rid", record_id.to_string()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<ConversationRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl ConversationStore for SurrealConversationStore {
    async fn save(&self, record: ConversationRecord) -> StorageResult<()> {
        record.validate()?;
        if self.record_exists(&record.id).await? {
            return Err(StorageError::Duplicate { id: record.id });
        }

        debug!(
            record_id = %record.id,
            customer_id = %record.customer_id,
            messages = record.messages.len(),
            "saving conversation"
        );

        let row = ConversationRow::from(record);
        let _created: Option<ConversationRow> = self
            .db
            .create("conversations")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn latest_for_customer(
        &self,
        customer_id: &str,
    ) -> StorageResult<Option<ConversationRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM conversations WHERE customer_id = $cid \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("cid", customer_id.to_string()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<ConversationRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(rows.into_iter().next().map(ConversationRecord::from))
    }

    async fn list_for_customer(
        &self,
        customer_id: &str,
    ) -> StorageResult<Vec<ConversationRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM conversations WHERE customer_id = $cid \
                 ORDER BY created_at DESC",
            )
            .bind(("cid", customer_id.to_string()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<ConversationRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(rows.into_iter().map(ConversationRecord::from).collect())
    }
}
