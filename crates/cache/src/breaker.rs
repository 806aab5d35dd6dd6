//! Circuit breaker backed by the cache store
//!
//! The failure counter lives under a single cache key with a TTL, so every
//! process sharing the store shares the breaker. Once the counter reaches the
//! threshold, calls are refused without invoking the operation until the
//! counter expires or a success clears it.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thicode_common::config::env_parse;
use thiserror::Error;

use crate::{CacheError, CacheStore};

pub const DEFAULT_BREAKER_KEY: &str = "ai_service_circuit_breaker";
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Cache key holding the failure counter
    pub key: String,
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Counter lifetime, re-armed on each failure
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_BREAKER_KEY.to_string(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }
}

impl CircuitBreakerConfig {
    /// Load from `CIRCUIT_BREAKER_THRESHOLD` and `CIRCUIT_BREAKER_RESET_SECS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            key: defaults.key,
            failure_threshold: env_parse("CIRCUIT_BREAKER_THRESHOLD", defaults.failure_threshold)
                .max(1),
            reset_timeout: Duration::from_secs(env_parse(
                "CIRCUIT_BREAKER_RESET_SECS",
                defaults.reset_timeout.as_secs(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit open after {failures} consecutive failures")]
    Open { failures: u32 },

    #[error("{0}")]
    Inner(E),

    #[error("Circuit breaker store error: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Clone)]
pub struct CircuitBreaker {
    cache: Arc<dyn CacheStore>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(cache: Arc<dyn CacheStore>, config: CircuitBreakerConfig) -> Self {
        Self { cache, config }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current failure count; a missing or unreadable counter reads as zero.
    pub async fn failure_count(&self) -> Result<u32, CacheError> {
        Ok(self
            .cache
            .get(&self.config.key)
            .await?
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0))
    }

    pub async fn state(&self) -> Result<CircuitState, CacheError> {
        if self.failure_count().await? >= self.config.failure_threshold {
            Ok(CircuitState::Open)
        } else {
            Ok(CircuitState::Closed)
        }
    }

    /// Clear the failure counter
    pub async fn reset(&self) -> Result<(), CacheError> {
        self.cache.delete(&self.config.key).await
    }

    /// Invoke `op` unless the circuit is open.
    ///
    /// Success clears the counter. Failure increments it and re-arms its TTL;
    /// the caller always gets the operation's own error back.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let failures = self.failure_count().await?;
        if failures >= self.config.failure_threshold {
            tracing::debug!(key = %self.config.key, failures, "Circuit open, refusing call");
            return Err(CircuitBreakerError::Open { failures });
        }

        match op().await {
            Ok(value) => {
                if failures > 0 {
                    self.reset().await?;
                    tracing::info!(key = %self.config.key, "Circuit closed after success");
                }
                Ok(value)
            }
            Err(e) => {
                let count = self
                    .cache
                    .increment(&self.config.key, self.config.reset_timeout)
                    .await?;
                if count >= i64::from(self.config.failure_threshold) {
                    tracing::warn!(
                        key = %self.config.key,
                        failures = count,
                        reset_secs = self.config.reset_timeout.as_secs(),
                        error = %e,
                        "Circuit opened"
                    );
                } else {
                    tracing::debug!(key = %self.config.key, failures = count, error = %e, "Call failed");
                }
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }
}
