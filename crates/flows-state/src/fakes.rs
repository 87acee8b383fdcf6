//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryConversationStore` satisfies the `ConversationStore` contract
//! without any external dependencies.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

/// In-memory conversation store backed by a `Vec` in insertion order.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    records: Mutex<Vec<ConversationRecord>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all customers.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn save(&self, record: ConversationRecord) -> StorageResult<()> {
        record.validate()?;
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.id == record.id) {
            return Err(StorageError::Duplicate { id: record.id });
        }
        records.push(record);
        Ok(())
    }

    async fn latest_for_customer(
        &self,
        customer_id: &str,
    ) -> StorageResult<Option<ConversationRecord>> {
        Ok(self.list_for_customer(customer_id).await?.into_iter().next())
    }

    async fn list_for_customer(
        &self,
        customer_id: &str,
    ) -> StorageResult<Vec<ConversationRecord>> {
        let records = self.records.lock().unwrap();
        let mut matching: Vec<ConversationRecord> = records
            .iter()
            .filter(|r| r.customer_id == customer_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order between equal timestamps; reverse
        // the insertion order first so later saves win ties.
        matching.reverse();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}
