//! Plain HTTP downloads of search results

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::http::{build_client, ensure_success};
use crate::Result;

const SERVICE: &str = "http-fetch";

/// Downloads the body at a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    http_client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http_client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http_client.get(url).send().await?;
        let response = ensure_success(SERVICE, response).await?;
        let bytes = response.bytes().await?;
        debug!(size = bytes.len(), "fetched");
        Ok(bytes.to_vec())
    }
}
