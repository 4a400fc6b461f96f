//! Bounded retry with exponential backoff for provider backpressure.
//!
//! Only `AppError::RateLimited` is retried. Every other error, including
//! timeouts, is returned on the first occurrence.

use docqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry settings for rate-limited provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    ///
    /// A provider-supplied `retry_after_ms` raises the delay but never past
    /// `max_backoff_ms`.
    pub fn backoff_for(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        let exponential = self.initial_backoff_ms.saturating_mul(factor);
        let delay = exponential
            .max(retry_after_ms.unwrap_or(0))
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

/// Run `op`, retrying rate-limit failures with exponential backoff.
///
/// Each attempt is bounded by `timeout` when given; an elapsed timeout is an
/// `AppError::Llm` and is not retried. When attempts are exhausted the last
/// `RateLimited` error is returned so the caller can escalate it into the
/// error of its own layer.
pub async fn with_rate_limit_retry<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Option<Duration>,
    label: &str,
    mut op: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, op()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Llm(format!(
                    "{} timed out after {}ms",
                    label,
                    limit.as_millis()
                ))),
            },
            None => op().await,
        };

        match result {
            Err(AppError::RateLimited {
                message,
                retry_after_ms,
            }) if attempt < max_attempts => {
                let delay = policy.backoff_for(attempt, retry_after_ms);
                tracing::warn!(
                    "{} rate limited (attempt {}/{}): {}; retrying in {}ms",
                    label,
                    attempt,
                    max_attempts,
                    message,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
