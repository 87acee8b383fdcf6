//! Document parsing client (Azure Document Intelligence, prebuilt-layout)
//!
//! Submits raw bytes for analysis, then polls the `Operation-Location`
//! returned by the service until the markdown rendering is ready.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::AdapterError;
use crate::http::{build_client, ensure_success, read_json, trim_endpoint, PollPolicy};
use crate::Result;

const SERVICE: &str = "document-intelligence";

pub const DEFAULT_DOCUMENT_API_VERSION: &str = "2024-02-29-preview";

/// Converts a document into markdown.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn to_markdown(&self, bytes: Vec<u8>) -> Result<String>;
}

/// Document Intelligence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIntelligenceConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    /// Analysis model, `prebuilt-layout` by default
    pub model: String,
    pub timeout_secs: u64,
}

impl DocumentIntelligenceConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_version: DEFAULT_DOCUMENT_API_VERSION.to_string(),
            model: "prebuilt-layout".to_string(),
            timeout_secs: 60,
        }
    }

    /// Create from environment variables
    ///
    /// Reads DOCUMENT_INTELLIGENCE_ENDPOINT and DOCUMENT_INTELLIGENCE_API_KEY.
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("DOCUMENT_INTELLIGENCE_ENDPOINT").map_err(|_| {
            AdapterError::NotConfigured("DOCUMENT_INTELLIGENCE_ENDPOINT".into())
        })?;
        let api_key = std::env::var("DOCUMENT_INTELLIGENCE_API_KEY")
            .map_err(|_| AdapterError::NotConfigured("DOCUMENT_INTELLIGENCE_API_KEY".into()))?;
        Ok(Self::new(endpoint, api_key))
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/{}:analyze?api-version={}&outputContentFormat=markdown",
            trim_endpoint(&self.endpoint),
            self.model,
            self.api_version
        )
    }
}

#[derive(Deserialize)]
struct AnalyzeOperation {
    status: String,
    #[serde(rename = "analyzeResult")]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    content: String,
}

/// Outcome of one poll of the analyze operation.
#[derive(Debug, PartialEq)]
enum PollState {
    Pending,
    Done(String),
}

fn interpret(op: AnalyzeOperation) -> Result<PollState> {
    match op.status.as_str() {
        "notStarted" | "running" => Ok(PollState::Pending),
        "succeeded" => op
            .analyze_result
            .map(|r| PollState::Done(r.content))
            .ok_or_else(|| AdapterError::invalid(SERVICE, "succeeded without analyzeResult")),
        other => Err(AdapterError::OperationFailed {
            service: SERVICE,
            status: other.to_string(),
            detail: op.error.map(|e| e.to_string()).unwrap_or_default(),
        }),
    }
}

/// Azure Document Intelligence client.
pub struct DocumentIntelligence {
    config: DocumentIntelligenceConfig,
    poll: PollPolicy,
    http_client: reqwest::Client,
}

impl DocumentIntelligence {
    pub fn new(config: DocumentIntelligenceConfig) -> Result<Self> {
        let http_client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            poll: PollPolicy::default(),
            http_client,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(DocumentIntelligenceConfig::from_env()?)
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }
}

#[async_trait]
impl DocumentParser for DocumentIntelligence {
    #[instrument(skip(self, bytes), fields(size = bytes.len(), model = %self.config.model))]
    async fn to_markdown(&self, bytes: Vec<u8>) -> Result<String> {
        let response = self
            .http_client
            .post(self.config.analyze_url())
            .header("Ocp-Apim-Subscription-Key", &self.config.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        let response = ensure_success(SERVICE, response).await?;

        let operation_url = response
            .headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AdapterError::invalid(SERVICE, "missing Operation-Location header"))?;
        debug!(operation = %operation_url, "analysis submitted");

        for _ in 0..self.poll.max_polls {
            let response = self
                .http_client
                .get(&operation_url)
                .header("Ocp-Apim-Subscription-Key", &self.config.api_key)
                .send()
                .await?;
            let op: AnalyzeOperation = read_json(SERVICE, response).await?;

            if let PollState::Done(markdown) = interpret(op)? {
                info!(chars = markdown.len(), "document converted to markdown");
                return Ok(markdown);
            }
            tokio::time::sleep(self.poll.interval).await;
        }

        Err(AdapterError::PollExhausted {
            service: SERVICE,
            polls: self.poll.max_polls,
        })
    }
}
