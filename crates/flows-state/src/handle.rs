//! SurrealDB connection setup
//!
//! Supports in-memory (`mem://`), local file (`surrealkv://`) and remote
//! WebSocket (`ws://` / `wss://`) endpoints, with optional sign-in.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::Result;

/// Default on-disk location when no endpoint is configured
pub const DEFAULT_LOCAL_PATH: &str = ".flows/db";

/// Sign-in credentials for a remote SurrealDB instance
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Root user (true) or database user (false)
    pub is_root: bool,
}

/// Connection settings for the conversation store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Endpoint URL (e.g. "mem://", "surrealkv://.flows/db", "wss://xxx.surrealdb.cloud")
    pub endpoint: String,
    pub credentials: Option<Credentials>,
    /// Namespace (default: "flows")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
}

impl StoreConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials: None,
            namespace: "flows".to_string(),
            database: "main".to_string(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new("mem://")
    }

    /// File-backed store rooted at `path`
    pub fn local(path: impl AsRef<str>) -> Self {
        Self::new(format!("surrealkv://{}", path.as_ref()))
    }

    /// Sign in as a database user
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
            is_root: false,
        });
        self
    }

    /// Set whether the configured user is a root user
    pub fn with_root(mut self, is_root: bool) -> Self {
        if let Some(creds) = self.credentials.as_mut() {
            creds.is_root = is_root;
        }
        self
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Build from environment variables
    ///
    /// Reads, in order of precedence:
    /// - SURREALDB_ENDPOINT + SURREALDB_USERNAME + SURREALDB_PASSWORD (remote, signed in)
    /// - SURREALDB_URL (any endpoint, no sign-in)
    /// - otherwise a local file store at [`DEFAULT_LOCAL_PATH`]
    ///
    /// SURREALDB_NAMESPACE, SURREALDB_DATABASE and SURREALDB_ROOT apply to all three.
    pub fn from_env() -> Self {
        let remote = (
            std::env::var("SURREALDB_ENDPOINT"),
            std::env::var("SURREALDB_USERNAME"),
            std::env::var("SURREALDB_PASSWORD"),
        );

        let mut config = match remote {
            (Ok(endpoint), Ok(username), Ok(password)) => {
                let is_root = std::env::var("SURREALDB_ROOT")
                    .map(|v| v.to_lowercase() == "true")
                    .unwrap_or(false);
                Self::new(endpoint)
                    .with_credentials(username, password)
                    .with_root(is_root)
            }
            _ => match std::env::var("SURREALDB_URL") {
                Ok(url) => Self::new(url),
                Err(_) => Self::local(DEFAULT_LOCAL_PATH),
            },
        };

        if let Ok(ns) = std::env::var("SURREALDB_NAMESPACE") {
            config.namespace = ns;
        }
        if let Ok(db) = std::env::var("SURREALDB_DATABASE") {
            config.database = db;
        }
        config
    }

    fn local_path(&self) -> Option<&str> {
        self.endpoint.strip_prefix("surrealkv://")
    }
}

/// Open a connection, sign in if credentials are set, select the namespace
/// and database, and run the schema migration.
#[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
pub async fn connect(config: &StoreConfig) -> Result<Surreal<Any>> {
    if let Some(path) = config.local_path() {
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
    }

    let db = surrealdb::engine::any::connect(config.endpoint.as_str())
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if let Some(creds) = &config.credentials {
        if creds.is_root {
            db.signin(Root {
                username: &creds.username,
                password: &creds.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root authentication failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &creds.username,
                password: &creds.password,
            })
            .await
            .map_err(|e| {
                StateError::Connection(format!("Database authentication failed: {e}"))
            })?;
        }
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to select namespace/database: {}", e))
        })?;

    migrations::init_schema(&db).await?;

    info!("SurrealDB connected and schema initialized");
    Ok(db)
}
