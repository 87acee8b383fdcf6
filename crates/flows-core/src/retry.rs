//! Retry with exponential backoff for flaky upstream calls.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::metrics::METRICS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first (0 behaves like 1).
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `attempt + 1`, given `attempt` (1-based) failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.backoff_base_ms
                .saturating_mul(factor)
                .min(self.backoff_max_ms),
        )
    }
}

/// Call `op` until it succeeds or `max_attempts` is used up, returning the
/// last error.
pub async fn retry_with_backoff<T, E, F, Fut>(config: &RetryConfig, what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                let delay = config.delay_after(attempt);
                warn!(what, attempt, max_attempts, delay_ms = delay.as_millis() as u64, error = %e, "attempt failed, retrying");
                METRICS.inc_retries();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
