//! SurrealDB schema migrations and initialization

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all flows tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing flows SurrealDB schema");

    init_conversations_table(db).await?;

    info!("flows schema initialization complete");
    Ok(())
}

/// Initialize `conversations` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE conversations {
///   record_id:        STRING (unique)
///   conversation_id:  STRING (indexed)
///   customer_id:      STRING (indexed)
///   messages:         ARRAY<OBJECT{role, name?, content}>
///   created_at:       DATETIME
/// }
/// ```
///
/// Rows are append-only; the latest conversation for a customer is the row
/// with the greatest `created_at`.
async fn init_conversations_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing conversations table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS conversations
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_record_id ON TABLE conversations COLUMNS record_id UNIQUE;

        DEFINE INDEX IF NOT EXISTS idx_conversation_id ON TABLE conversations COLUMNS conversation_id;

        -- Composite index (customer_id, created_at) for latest-conversation lookups
        DEFINE INDEX IF NOT EXISTS idx_customer_created_at ON TABLE conversations COLUMNS customer_id, created_at;
    "#;

    db.query(sql)
        .await?
        .check()
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?;
    info!("✓ conversations table initialized");
    Ok(())
}
