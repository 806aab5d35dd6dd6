//! Retry policy with linear backoff
//!
//! Wraps a fallible async operation. Errors decide for themselves whether a
//! retry makes sense through [`Retryable`]; anything else is returned on the
//! first failure.
//!
//! | Retry | Delay (base = 100ms) |
//! |-------|----------------------|
//! | 1     | 100ms                |
//! | 2     | 200ms                |
//! | 3     | 300ms                |

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::env_parse;

/// Classifies errors the retry loop may try again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay multiplied by the retry number before each retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that runs the operation exactly once
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Load from `RETRY_MAX_RETRIES` and `RETRY_BASE_DELAY_MS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: env_parse("RETRY_MAX_RETRIES", defaults.max_retries).min(20),
            base_delay: Duration::from_millis(
                env_parse("RETRY_BASE_DELAY_MS", defaults.base_delay.as_millis() as u64)
                    .min(60_000),
            ),
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. The last error is returned on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if retry > 0 {
                        tracing::debug!(operation, retries = retry, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.delay_for_retry(retry);
                    tracing::warn!(
                        operation,
                        retry,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(operation, retries = retry, error = %e, "Retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}
