//! Web search client (Bing Web Search v7)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::AdapterError;
use crate::http::{build_client, read_json};
use crate::Result;

const SERVICE: &str = "bing-search";

pub const DEFAULT_BING_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";

/// Returns result URLs for a query.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, count: u32) -> Result<Vec<String>>;
}

/// Bing search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BingSearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl BingSearchConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_BING_ENDPOINT.to_string(),
            api_key: api_key.into(),
            timeout_secs: 30,
        }
    }

    /// Create from environment variables
    ///
    /// Reads BING_SEARCH_API_KEY (required) and BING_SEARCH_ENDPOINT (optional).
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("BING_SEARCH_API_KEY")
            .map_err(|_| AdapterError::NotConfigured("BING_SEARCH_API_KEY".into()))?;
        let mut config = Self::new(api_key);
        if let Ok(endpoint) = std::env::var("BING_SEARCH_ENDPOINT") {
            config.endpoint = endpoint;
        }
        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "webPages")]
    web_pages: Option<WebPages>,
}

#[derive(Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<WebPage>,
}

#[derive(Deserialize)]
struct WebPage {
    url: String,
}

/// Result URLs in ranking order. A response without `webPages` has no hits.
fn result_urls(response: SearchResponse) -> Vec<String> {
    response
        .web_pages
        .map(|pages| pages.value.into_iter().map(|p| p.url).collect())
        .unwrap_or_default()
}

/// Bing Web Search v7 client.
pub struct BingSearch {
    config: BingSearchConfig,
    http_client: reqwest::Client,
}

impl BingSearch {
    pub fn new(config: BingSearchConfig) -> Result<Self> {
        let http_client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(BingSearchConfig::from_env()?)
    }
}

#[async_trait]
impl WebSearch for BingSearch {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, count: u32) -> Result<Vec<String>> {
        let response = self
            .http_client
            .get(&self.config.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.config.api_key)
            .query(&[("q", query.to_string()), ("count", count.to_string())])
            .send()
            .await?;

        let body: SearchResponse = read_json(SERVICE, response).await?;
        let urls = result_urls(body);
        debug!(hits = urls.len(), "search complete");
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_web_page_urls_in_order() {
        let body: SearchResponse = serde_json::from_str(
            r#"{
                "_type": "SearchResponse",
                "webPages": {
                    "totalEstimatedMatches": 2,
                    "value": [
                        {"name": "Annual report", "url": "https://example.com/a.pdf"},
                        {"name": "Factsheet", "url": "https://example.com/b.pdf"}
                    ]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(
            result_urls(body),
            vec!["https://example.com/a.pdf", "https://example.com/b.pdf"]
        );
    }

    #[test]
    fn missing_web_pages_means_no_hits() {
        let body: SearchResponse =
            serde_json::from_str(r#"{"_type": "SearchResponse"}"#).unwrap();
        assert!(result_urls(body).is_empty());
    }
}
