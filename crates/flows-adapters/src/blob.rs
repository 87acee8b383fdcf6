//! Blob storage client (Azure Blob Storage with a SAS token)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::AdapterError;
use crate::http::{build_client, ensure_success, trim_endpoint};
use crate::Result;

const SERVICE: &str = "blob-storage";

/// Reads and writes whole blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>>;

    /// Store `bytes` under `name`, returning the blob URL (without credentials).
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<String>;
}

/// True when `path` points at an Azure blob rather than a local file.
pub fn is_blob_url(path: &str) -> bool {
    path.starts_with("https://") && path.contains(".blob.core.windows.net/")
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Account URL, e.g. `https://acct.blob.core.windows.net`
    pub account_url: String,
    pub container: String,
    /// SAS token, with or without the leading `?`
    pub sas_token: String,
    pub timeout_secs: u64,
}

impl BlobConfig {
    pub fn new(
        account_url: impl Into<String>,
        container: impl Into<String>,
        sas_token: impl Into<String>,
    ) -> Self {
        Self {
            account_url: account_url.into(),
            container: container.into(),
            sas_token: sas_token.into(),
            timeout_secs: 120,
        }
    }

    /// Create from environment variables
    ///
    /// Reads BLOB_ACCOUNT_URL, BLOB_CONTAINER and BLOB_SAS_TOKEN.
    pub fn from_env() -> Result<Self> {
        let account_url = std::env::var("BLOB_ACCOUNT_URL")
            .map_err(|_| AdapterError::NotConfigured("BLOB_ACCOUNT_URL".into()))?;
        let container = std::env::var("BLOB_CONTAINER")
            .map_err(|_| AdapterError::NotConfigured("BLOB_CONTAINER".into()))?;
        let sas_token = std::env::var("BLOB_SAS_TOKEN")
            .map_err(|_| AdapterError::NotConfigured("BLOB_SAS_TOKEN".into()))?;
        Ok(Self::new(account_url, container, sas_token))
    }

    fn blob_url(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            trim_endpoint(&self.account_url),
            self.container,
            name.trim_start_matches('/')
        )
    }

    /// Append the SAS token to a blob URL belonging to this account.
    fn signed(&self, url: &str) -> String {
        let token = self.sas_token.trim_start_matches('?');
        if token.is_empty() || !url.starts_with(&trim_endpoint(&self.account_url)) {
            return url.to_string();
        }
        let sep = if url.contains('?') { '&' } else { '?' };
        format!("{url}{sep}{token}")
    }
}

/// Azure Blob Storage client.
pub struct AzureBlobStore {
    config: BlobConfig,
    http_client: reqwest::Client,
}

impl AzureBlobStore {
    pub fn new(config: BlobConfig) -> Result<Self> {
        let http_client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(BlobConfig::from_env()?)
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    #[instrument(skip(self))]
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http_client
            .get(self.config.signed(url))
            .send()
            .await?;
        let response = ensure_success(SERVICE, response).await?;
        let bytes = response.bytes().await?;
        debug!(size = bytes.len(), "blob downloaded");
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<String> {
        let url = self.config.blob_url(name);
        let response = self
            .http_client
            .put(self.config.signed(&url))
            .header("x-ms-blob-type", "BlockBlob")
            .body(bytes)
            .send()
            .await?;
        ensure_success(SERVICE, response).await?;
        debug!(%url, "blob uploaded");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BlobConfig {
        BlobConfig::new("https://acct.blob.core.windows.net/", "uploads", "?sv=2022&sig=abc")
    }

    #[test]
    fn recognizes_blob_urls() {
        assert!(is_blob_url(
            "https://acct.blob.core.windows.net/uploads/policy.pdf"
        ));
        assert!(!is_blob_url("/home/user/policy.pdf"));
        assert!(!is_blob_url("https://example.com/policy.pdf"));
    }

    #[test]
    fn blob_url_joins_container_and_name() {
        assert_eq!(
            config().blob_url("/cust-1/policy.pdf"),
            "https://acct.blob.core.windows.net/uploads/cust-1/policy.pdf"
        );
    }

    #[test]
    fn signs_only_own_account_urls() {
        let c = config();
        assert_eq!(
            c.signed("https://acct.blob.core.windows.net/uploads/a.pdf"),
            "https://acct.blob.core.windows.net/uploads/a.pdf?sv=2022&sig=abc"
        );
        assert_eq!(
            c.signed("https://other.blob.core.windows.net/x/a.pdf"),
            "https://other.blob.core.windows.net/x/a.pdf"
        );
    }
}
