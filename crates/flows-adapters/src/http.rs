//! Shared reqwest plumbing for the service clients

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::AdapterError;
use crate::Result;

const USER_AGENT: &str = concat!("flows-adapters/", env!("CARGO_PKG_VERSION"));

/// Build a client with the crate user agent and a per-request timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Turn a non-success status into [`AdapterError::Api`] carrying the body.
pub(crate) async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AdapterError::Api {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Check status, then decode the JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    response: reqwest::Response,
) -> Result<T> {
    let response = ensure_success(service, response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| AdapterError::invalid(service, e.to_string()))
}

/// Polling schedule for long-running operations.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_polls: 300,
        }
    }
}

pub(crate) fn trim_endpoint(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}
