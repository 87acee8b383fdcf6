//! Flow configuration: a TOML file with environment overrides.
//!
//! ```toml
//! [azure_openai]
//! endpoint = "https://my-resource.openai.azure.com"
//! deployment = "gpt-4o"
//!
//! [session]
//! max_turns = 40
//! timeout_secs = 300
//! approval_policy = "substring"
//!
//! [research]
//! file_type = "pdf"
//! download_concurrency = 5
//! ```
//!
//! Secrets are usually left out of the file and supplied through the
//! environment (`AZURE_OPENAI_API_KEY`, `BING_SEARCH_API_KEY`, ...).

use std::path::{Path, PathBuf};
use std::time::Duration;

use flows_adapters::{AzureOpenAiConfig, BingSearchConfig, BlobConfig, DocumentIntelligenceConfig};
use flows_state::{StoreConfig, DEFAULT_LOCAL_PATH};
use serde::{Deserialize, Serialize};

use crate::chat::ChatConfig;
use crate::coordinator::ApprovalPolicy;
use crate::domain::{FlowError, Result};
use crate::research::ResearchConfig;
use crate::session::{SessionConfig, DEFAULT_MAX_TURNS, DEFAULT_TIMEOUT_SECS};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "flows.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowConfig {
    pub azure_openai: AzureOpenAiSection,
    pub search: SearchSection,
    pub documents: DocumentsSection,
    pub blob: BlobSection,
    pub store: StoreSection,
    pub session: SessionSection,
    pub research: ResearchConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AzureOpenAiSection {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub deployment: String,
    pub api_version: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl Default for AzureOpenAiSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            deployment: "gpt-4o".to_string(),
            api_version: None,
            temperature: None,
            max_tokens: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchSection {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentsSection {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlobSection {
    pub account_url: Option<String>,
    pub container: Option<String>,
    pub sas_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    /// `mem://`, `surrealkv://path` or `ws(s)://host`; a local file store
    /// when unset
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub root: bool,
    pub namespace: String,
    pub database: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            username: None,
            password: None,
            root: false,
            namespace: "flows".to_string(),
            database: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    pub max_turns: usize,
    pub timeout_secs: u64,
    pub approval_policy: ApprovalPolicy,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            approval_policy: ApprovalPolicy::default(),
        }
    }
}

fn required(value: &Option<String>, key: &str, env: &str) -> Result<String> {
    value
        .clone()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| FlowError::Config(format!("{key} is not set (or set {env})")))
}

fn parse<T: std::str::FromStr>(env: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| FlowError::Config(format!("{env}={raw:?}: {e}")))
}

impl FlowConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FlowError::Config(format!("invalid config: {e}")))
    }

    /// Read `path`, or `flows.toml` in the working directory when it exists,
    /// then apply environment overrides.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup` (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let set = |target: &mut Option<String>, key: &str| {
            if let Some(v) = lookup(key) {
                *target = Some(v);
            }
        };

        set(&mut self.azure_openai.endpoint, "AZURE_OPENAI_ENDPOINT");
        set(&mut self.azure_openai.api_key, "AZURE_OPENAI_API_KEY");
        set(&mut self.azure_openai.api_version, "AZURE_OPENAI_API_VERSION");
        if let Some(v) = lookup("AZURE_OPENAI_DEPLOYMENT") {
            self.azure_openai.deployment = v;
        }

        set(&mut self.search.endpoint, "BING_SEARCH_ENDPOINT");
        set(&mut self.search.api_key, "BING_SEARCH_API_KEY");

        set(&mut self.documents.endpoint, "DOCUMENT_INTELLIGENCE_ENDPOINT");
        set(&mut self.documents.api_key, "DOCUMENT_INTELLIGENCE_API_KEY");

        set(&mut self.blob.account_url, "BLOB_ACCOUNT_URL");
        set(&mut self.blob.container, "BLOB_CONTAINER");
        set(&mut self.blob.sas_token, "BLOB_SAS_TOKEN");

        set(&mut self.store.endpoint, "SURREALDB_URL");
        set(&mut self.store.endpoint, "SURREALDB_ENDPOINT");
        set(&mut self.store.username, "SURREALDB_USERNAME");
        set(&mut self.store.password, "SURREALDB_PASSWORD");
        if let Some(v) = lookup("SURREALDB_NAMESPACE") {
            self.store.namespace = v;
        }
        if let Some(v) = lookup("SURREALDB_DATABASE") {
            self.store.database = v;
        }
        if let Some(v) = lookup("SURREALDB_ROOT") {
            self.store.root = v.eq_ignore_ascii_case("true");
        }

        if let Some(v) = lookup("FLOWS_MAX_TURNS") {
            self.session.max_turns = parse("FLOWS_MAX_TURNS", &v)?;
        }
        if let Some(v) = lookup("FLOWS_TIMEOUT_SECS") {
            self.session.timeout_secs = parse("FLOWS_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("FLOWS_APPROVAL_POLICY") {
            self.session.approval_policy = parse("FLOWS_APPROVAL_POLICY", &v)?;
        }
        if let Some(v) = lookup("FLOWS_FILE_TYPE") {
            self.research.file_type = v.trim().trim_start_matches('.').to_string();
        }
        if let Some(v) = lookup("FLOWS_DOWNLOAD_CONCURRENCY") {
            self.research.download_concurrency = parse("FLOWS_DOWNLOAD_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("FLOWS_SUMMARY_CONCURRENCY") {
            self.research.summary_concurrency = parse("FLOWS_SUMMARY_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("FLOWS_MAX_TOTAL_TOKENS") {
            self.chat.max_total_tokens = parse("FLOWS_MAX_TOTAL_TOKENS", &v)?;
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_turns: self.session.max_turns,
            timeout: Duration::from_secs(self.session.timeout_secs),
            policy: self.session.approval_policy,
        }
    }

    pub fn azure_openai(&self) -> Result<AzureOpenAiConfig> {
        let section = &self.azure_openai;
        let mut config = AzureOpenAiConfig::new(
            required(&section.endpoint, "azure_openai.endpoint", "AZURE_OPENAI_ENDPOINT")?,
            required(&section.api_key, "azure_openai.api_key", "AZURE_OPENAI_API_KEY")?,
            section.deployment.as_str(),
        );
        if let Some(version) = &section.api_version {
            config = config.with_api_version(version.as_str());
        }
        if let Some(t) = section.temperature {
            config = config.with_temperature(t);
        }
        if let Some(n) = section.max_tokens {
            config = config.with_max_tokens(n);
        }
        if let Some(secs) = section.timeout_secs {
            config = config.with_timeout_secs(secs);
        }
        Ok(config)
    }

    pub fn search(&self) -> Result<BingSearchConfig> {
        let mut config = BingSearchConfig::new(required(
            &self.search.api_key,
            "search.api_key",
            "BING_SEARCH_API_KEY",
        )?);
        if let Some(endpoint) = &self.search.endpoint {
            config = config.with_endpoint(endpoint.as_str());
        }
        Ok(config)
    }

    pub fn documents(&self) -> Result<DocumentIntelligenceConfig> {
        Ok(DocumentIntelligenceConfig::new(
            required(
                &self.documents.endpoint,
                "documents.endpoint",
                "DOCUMENT_INTELLIGENCE_ENDPOINT",
            )?,
            required(
                &self.documents.api_key,
                "documents.api_key",
                "DOCUMENT_INTELLIGENCE_API_KEY",
            )?,
        ))
    }

    /// `None` when no blob account is configured.
    pub fn blob(&self) -> Result<Option<BlobConfig>> {
        if self.blob.account_url.is_none() {
            return Ok(None);
        }
        Ok(Some(BlobConfig::new(
            required(&self.blob.account_url, "blob.account_url", "BLOB_ACCOUNT_URL")?,
            required(&self.blob.container, "blob.container", "BLOB_CONTAINER")?,
            self.blob.sas_token.clone().unwrap_or_default(),
        )))
    }

    pub fn store(&self) -> StoreConfig {
        let store = &self.store;
        let base = match &store.endpoint {
            Some(endpoint) => StoreConfig::new(endpoint.as_str()),
            None => StoreConfig::local(DEFAULT_LOCAL_PATH),
        };
        let base = match (&store.username, &store.password) {
            (Some(user), Some(pass)) => base
                .with_credentials(user.as_str(), pass.as_str())
                .with_root(store.root),
            _ => base,
        };
        base.with_namespace(store.namespace.as_str())
            .with_database(store.database.as_str())
    }
}
