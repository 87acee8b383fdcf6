//! Chat completion client
//!
//! `GenerationAdapter` is the seam every flow calls to get the next
//! contribution for a role. `AzureOpenAiChat` implements it over the Azure
//! OpenAI chat completions REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::AdapterError;
use crate::http::{build_client, read_json, trim_endpoint};
use crate::Result;

const SERVICE: &str = "azure-openai";

/// Default API version for chat completions and the assistants surface.
pub const DEFAULT_API_VERSION: &str = "2024-05-01-preview";

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Participant name, sent so the model can tell speakers apart
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            name: None,
        }
    }

    /// Attach a participant name.
    ///
    /// The chat API only accepts `[a-zA-Z0-9_-]` in names, so anything else
    /// is replaced with `_`.
    pub fn with_name(mut self, name: &str) -> Self {
        let cleaned: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.name = Some(cleaned);
        self
    }
}

/// Produces the next contribution from an accumulated conversation.
#[async_trait]
pub trait GenerationAdapter: Send + Sync {
    /// Provider name for logs.
    fn provider(&self) -> &str;

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Azure OpenAI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureOpenAiConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub endpoint: String,
    pub api_key: String,
    /// Chat model deployment name
    pub deployment: String,
    pub api_version: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl AzureOpenAiConfig {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            deployment: deployment.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            temperature: 0.7,
            max_tokens: None,
            timeout_secs: 120,
        }
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - AZURE_OPENAI_ENDPOINT (required)
    /// - AZURE_OPENAI_API_KEY (required)
    /// - AZURE_OPENAI_DEPLOYMENT (optional, default: "gpt-4o")
    /// - AZURE_OPENAI_API_VERSION (optional)
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("AZURE_OPENAI_ENDPOINT")
            .map_err(|_| AdapterError::NotConfigured("AZURE_OPENAI_ENDPOINT".into()))?;
        let api_key = std::env::var("AZURE_OPENAI_API_KEY")
            .map_err(|_| AdapterError::NotConfigured("AZURE_OPENAI_API_KEY".into()))?;
        let deployment =
            std::env::var("AZURE_OPENAI_DEPLOYMENT").unwrap_or_else(|_| "gpt-4o".to_string());

        let mut config = Self::new(endpoint, api_key, deployment);
        if let Ok(version) = std::env::var("AZURE_OPENAI_API_VERSION") {
            config.api_version = version;
        }
        Ok(config)
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// `{endpoint}/openai/{path}?api-version={version}`
    pub(crate) fn url(&self, path: &str) -> String {
        format!(
            "{}/openai/{}?api-version={}",
            trim_endpoint(&self.endpoint),
            path.trim_start_matches('/'),
            self.api_version
        )
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the first choice's text out of a chat completion response.
fn first_choice(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(AdapterError::EmptyResponse(SERVICE))
}

/// Azure OpenAI chat completions client.
pub struct AzureOpenAiChat {
    config: AzureOpenAiConfig,
    http_client: reqwest::Client,
}

impl AzureOpenAiChat {
    pub fn new(config: AzureOpenAiConfig) -> Result<Self> {
        let http_client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(AzureOpenAiConfig::from_env()?)
    }

    pub fn config(&self) -> &AzureOpenAiConfig {
        &self.config
    }
}

#[async_trait]
impl GenerationAdapter for AzureOpenAiChat {
    fn provider(&self) -> &str {
        SERVICE
    }

    #[instrument(skip(self, messages), fields(deployment = %self.config.deployment))]
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!("Generating completion with {} messages", messages.len());

        let url = self.config.url(&format!(
            "deployments/{}/chat/completions",
            self.config.deployment
        ));
        let request = ChatCompletionRequest {
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .http_client
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let body: ChatCompletionResponse = read_json(SERVICE, response).await?;
        first_choice(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_includes_deployment_and_version() {
        let config = AzureOpenAiConfig::new("https://res.openai.azure.com/", "k", "gpt-4o")
            .with_api_version("2024-06-01");
        assert_eq!(
            config.url("deployments/gpt-4o/chat/completions"),
            "https://res.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn name_is_sanitized() {
        let msg = ChatMessage::user("hi").with_name("Email Writer.v2");
        assert_eq!(msg.name.as_deref(), Some("Email_Writer_v2"));
    }

    #[test]
    fn request_serializes_lowercase_roles_and_skips_missing_name() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::assistant("ok").with_name("Editor"),
        ];
        let request = ChatCompletionRequest {
            messages: &messages,
            temperature: 0.2,
            max_tokens: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json["messages"][0].get("name").is_none());
        assert_eq!(json["messages"][1]["name"], "Editor");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn first_choice_extracts_content() {
        let body: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"APPROVE"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice(body).unwrap(), "APPROVE");
    }

    #[test]
    fn first_choice_empty_is_error() {
        let body: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            first_choice(body),
            Err(AdapterError::EmptyResponse(_))
        ));
    }
}
