//! ThiCode Cache Service
//!
//! Shared key-value store used for cross-request coordination:
//! - `CacheStore` boundary with in-memory and Redis backends
//! - Lease locks built on atomic set-if-absent (`lock`)
//! - A circuit breaker whose failure counter lives in the store (`breaker`)
//!
//! All state is reached through an injected `Arc<dyn CacheStore>`, so every
//! process pointed at the same Redis shares locks and breaker state.

pub mod breaker;
pub mod lock;
pub mod memory;
pub mod redis_cache;

use std::time::Duration;

use thiserror::Error;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use lock::{LockError, LockGuard, LockKey, LockManager};
pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache configuration error: {0}")]
    Configuration(String),

    #[error("Cache connection error: {0}")]
    Connection(String),

    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Key-value store with per-entry expiry.
///
/// Values are strings; counters are stored in their decimal form.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Store `value` only if `key` is absent. Returns `true` when stored.
    async fn add(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Fetch a live (non-expired) value.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value`, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Remove `key`. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Add one to the counter at `key` and re-arm its expiry.
    ///
    /// The default is a read-modify-write; backends with a native counter
    /// override it.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let current = self
            .get(key)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current.saturating_add(1);
        self.set(key, &next.to_string(), ttl).await?;
        Ok(next)
    }

    /// Remove `key` only while it still holds `expected`.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        match self.get(key).await? {
            Some(current) if current == expected => {
                self.delete(key).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Cache service configuration.
#[derive(Clone)]
pub struct CacheConfig {
    /// Cache provider (memory, redis)
    pub provider: String,
    /// Redis connection URL, required for the redis provider
    pub redis_url: Option<String>,
    /// Prefix applied to every key in shared backends
    pub key_prefix: String,
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("provider", &self.provider)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            provider: "memory".to_string(),
            redis_url: None,
            key_prefix: "thicode:".to_string(),
        }
    }
}

impl CacheConfig {
    /// Create cache config from environment variables.
    pub fn from_env() -> Result<Self, CacheError> {
        let provider = std::env::var("CACHE_PROVIDER").unwrap_or_else(|_| "memory".to_string());
        let redis_url = std::env::var("REDIS_URL").ok().filter(|u| !u.is_empty());
        let key_prefix =
            std::env::var("CACHE_KEY_PREFIX").unwrap_or_else(|_| "thicode:".to_string());

        if provider == "redis" && redis_url.is_none() {
            return Err(CacheError::Configuration(
                "REDIS_URL is required for redis cache provider".to_string(),
            ));
        }

        Ok(Self {
            provider,
            redis_url,
            key_prefix,
        })
    }
}

/// Factory for creating CacheStore implementations.
pub struct CacheServiceFactory;

impl CacheServiceFactory {
    /// Create a CacheStore based on configuration.
    pub async fn create(config: CacheConfig) -> Result<Box<dyn CacheStore>, CacheError> {
        match config.provider.as_str() {
            "redis" => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    CacheError::Configuration(
                        "REDIS_URL is required for redis cache provider".to_string(),
                    )
                })?;
                tracing::info!("Creating Redis cache store");
                Ok(Box::new(RedisCache::connect(url, &config.key_prefix).await?))
            }
            "memory" => {
                tracing::info!("Creating in-memory cache store");
                Ok(Box::new(InMemoryCache::new()))
            }
            provider => Err(CacheError::Configuration(format!(
                "Unknown cache provider: {}. Supported providers: memory, redis",
                provider
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_memory() {
        let config = CacheConfig::default();
        assert_eq!(config.provider, "memory");
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_config_debug_redacts_url() {
        let config = CacheConfig {
            provider: "redis".to_string(),
            redis_url: Some("redis://:secret@localhost:6379".to_string()),
            key_prefix: "thicode:".to_string(),
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    #[serial]
    fn test_from_env_redis_requires_url() {
        std::env::set_var("CACHE_PROVIDER", "redis");
        std::env::remove_var("REDIS_URL");
        let result = CacheConfig::from_env();
        std::env::remove_var("CACHE_PROVIDER");

        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_factory_creates_memory_store() {
        let store = CacheServiceFactory::create(CacheConfig::default())
            .await
            .unwrap();
        assert!(store.add("k", "v", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_factory_rejects_unknown_provider() {
        let config = CacheConfig {
            provider: "memcached".to_string(),
            ..CacheConfig::default()
        };
        let result = CacheServiceFactory::create(config).await;
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_factory_redis_without_url_fails() {
        let config = CacheConfig {
            provider: "redis".to_string(),
            redis_url: None,
            key_prefix: "thicode:".to_string(),
        };
        let result = CacheServiceFactory::create(config).await;
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }
}
