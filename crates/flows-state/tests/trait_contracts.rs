//! Trait contract tests for ConversationStore.
//!
//! Each contract runs against the in-memory fake and the SurrealDB
//! implementation (in-memory engine). Any conforming implementation must pass.

use chrono::{Duration, Utc};
use flows_state::fakes::MemoryConversationStore;
use flows_state::storage_traits::*;
use flows_state::{StorageError, SurrealConversationStore};

fn record_at(customer: &str, conversation: &str, minutes_ago: i64, question: &str) -> ConversationRecord {
    let mut record = ConversationRecord::new(
        conversation,
        customer,
        vec![
            StoredMessage::user(question),
            StoredMessage::assistant(format!("answer to {question}")),
        ],
    );
    record.created_at = Utc::now() - Duration::minutes(minutes_ago);
    record
}

async fn surreal() -> SurrealConversationStore {
    SurrealConversationStore::in_memory().await.unwrap()
}

// ===========================================================================
// Contracts
// ===========================================================================

async fn contract_latest_is_newest_by_time(store: &dyn ConversationStore) {
    store.save(record_at("c1", "conv-a", 30, "first")).await.unwrap();
    store.save(record_at("c1", "conv-a", 1, "newest")).await.unwrap();
    store.save(record_at("c1", "conv-b", 10, "middle")).await.unwrap();

    let latest = store.latest_for_customer("c1").await.unwrap().unwrap();
    assert_eq!(latest.messages[0].content, "newest");
}

async fn contract_latest_none_for_unknown_customer(store: &dyn ConversationStore) {
    store.save(record_at("c1", "conv-a", 0, "q")).await.unwrap();
    assert!(store.latest_for_customer("nobody").await.unwrap().is_none());
}

async fn contract_list_is_scoped_and_newest_first(store: &dyn ConversationStore) {
    store.save(record_at("c1", "conv-a", 20, "old")).await.unwrap();
    store.save(record_at("c2", "conv-x", 5, "other customer")).await.unwrap();
    store.save(record_at("c1", "conv-a", 2, "new")).await.unwrap();

    let listed = store.list_for_customer("c1").await.unwrap();
    let firsts: Vec<&str> = listed.iter().map(|r| r.messages[0].content.as_str()).collect();
    assert_eq!(firsts, vec!["new", "old"]);
    assert!(listed.iter().all(|r| r.customer_id == "c1"));
}

async fn contract_duplicate_id_rejected(store: &dyn ConversationStore) {
    let record = record_at("c1", "conv-a", 0, "q");
    store.save(record.clone()).await.unwrap();
    let err = store.save(record).await.unwrap_err();
    assert!(matches!(err, StorageError::Duplicate { .. }));
}

async fn contract_blank_customer_rejected(store: &dyn ConversationStore) {
    let record = record_at("", "conv-a", 0, "q");
    let err = store.save(record).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidRecord { .. }));
    assert!(store.list_for_customer("").await.unwrap().is_empty());
}

async fn contract_messages_round_trip(store: &dyn ConversationStore) {
    let mut record = record_at("c9", "conv-z", 0, "what is in the contract?");
    record
        .messages
        .push(StoredMessage::assistant("see clause 4").with_name("DocumentAgent"));
    store.save(record.clone()).await.unwrap();

    let loaded = store.latest_for_customer("c9").await.unwrap().unwrap();
    assert_eq!(loaded.id, record.id);
    assert_eq!(loaded.conversation_id, "conv-z");
    assert_eq!(loaded.messages, record.messages);
    assert_eq!(loaded.messages[2].name.as_deref(), Some("DocumentAgent"));
}

// ===========================================================================
// MemoryConversationStore
// ===========================================================================

#[tokio::test]
async fn memory_latest_is_newest_by_time() {
    contract_latest_is_newest_by_time(&MemoryConversationStore::new()).await;
}

#[tokio::test]
async fn memory_latest_none_for_unknown_customer() {
    contract_latest_none_for_unknown_customer(&MemoryConversationStore::new()).await;
}

#[tokio::test]
async fn memory_list_is_scoped_and_newest_first() {
    contract_list_is_scoped_and_newest_first(&MemoryConversationStore::new()).await;
}

#[tokio::test]
async fn memory_duplicate_id_rejected() {
    contract_duplicate_id_rejected(&MemoryConversationStore::new()).await;
}

#[tokio::test]
async fn memory_blank_customer_rejected() {
    let store = MemoryConversationStore::new();
    contract_blank_customer_rejected(&store).await;
    assert!(store.is_empty());
}

#[tokio::test]
async fn memory_messages_round_trip() {
    contract_messages_round_trip(&MemoryConversationStore::new()).await;
}

// ===========================================================================
// SurrealConversationStore (mem://)
// ===========================================================================

#[tokio::test]
async fn surreal_latest_is_newest_by_time() {
    contract_latest_is_newest_by_time(&surreal().await).await;
}

#[tokio::test]
async fn surreal_latest_none_for_unknown_customer() {
    contract_latest_none_for_unknown_customer(&surreal().await).await;
}

#[tokio::test]
async fn surreal_list_is_scoped_and_newest_first() {
    contract_list_is_scoped_and_newest_first(&surreal().await).await;
}

#[tokio::test]
async fn surreal_duplicate_id_rejected() {
    contract_duplicate_id_rejected(&surreal().await).await;
}

#[tokio::test]
async fn surreal_blank_customer_rejected() {
    contract_blank_customer_rejected(&surreal().await).await;
}

#[tokio::test]
async fn surreal_messages_round_trip() {
    contract_messages_round_trip(&surreal().await).await;
}
