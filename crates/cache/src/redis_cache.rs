//! Redis cache store
//!
//! Shared backend for multi-instance deployments. Uses a `ConnectionManager`
//! for automatic reconnection; every key is namespaced with the configured
//! prefix.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::{CacheError, CacheStore};

/// Deletes KEYS[1] only while it holds ARGV[1].
const DELETE_IF_EQ_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    key_prefix: String,
}

impl RedisCache {
    /// Connect to Redis at `url`.
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::Configuration(format!("Invalid Redis URL: {}", e)))?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to Redis");
            CacheError::Connection(e.to_string())
        })?;

        tracing::info!(key_prefix = %key_prefix, "Connected to Redis");

        Ok(Self {
            manager,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

fn backend_error(op: &'static str) -> impl Fn(redis::RedisError) -> CacheError {
    move |e| {
        tracing::error!(operation = op, error = %e, "Redis command failed");
        CacheError::Backend(format!("{} failed: {}", op, e))
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisCache {
    async fn add(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.build_key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend_error("SET NX"))?;

        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn
            .get(self.build_key(key))
            .await
            .map_err(backend_error("GET"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(self.build_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend_error("SET"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .del(self.build_key(key))
            .await
            .map_err(backend_error("DEL"))?;
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let redis_key = self.build_key(key);
        let mut conn = self.manager.clone();
        let (count, _): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(&redis_key)
            .cmd("PEXPIRE")
            .arg(&redis_key)
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend_error("INCR"))?;
        Ok(count)
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let deleted: i64 = redis::Script::new(DELETE_IF_EQ_SCRIPT)
            .key(self.build_key(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_error("EVAL"))?;
        Ok(deleted > 0)
    }
}
