//! In-memory cache store
//!
//! Single-process backend used for development and tests. Expired entries are
//! dropped lazily when touched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::{CacheError, CacheStore};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe in-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl CacheStore for InMemoryCache {
    async fn add(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| !e.is_expired()) {
            return Ok(false);
        }
        entries.insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let mut entries = self.entries.write().await;
        let current = entries
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| {
                e.value.parse::<i64>().map_err(|_| {
                    CacheError::Backend(format!("value at {} is not an integer", key))
                })
            })
            .transpose()?
            .unwrap_or(0);
        let next = current.saturating_add(1);
        entries.insert(key.to_string(), CacheEntry::new(next.to_string(), ttl));
        Ok(next)
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        let matches = entries
            .get(key)
            .is_some_and(|e| !e.is_expired() && e.value == expected);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_add_is_set_if_absent() {
        let cache = InMemoryCache::new();
        assert!(cache.add("lock", "a", TTL).await.unwrap());
        assert!(!cache.add("lock", "b", TTL).await.unwrap());
        assert_eq!(cache.get("lock").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_add_succeeds_after_expiry() {
        let cache = InMemoryCache::new();
        assert!(cache
            .add("lock", "a", Duration::from_millis(20))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get("lock").await.unwrap().is_none());
        assert!(cache.add("lock", "b", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_overwrites_and_delete_removes() {
        let cache = InMemoryCache::new();
        cache.set("k", "1", TTL).await.unwrap();
        cache.set("k", "2", TTL).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("2"));

        cache.delete("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        cache.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_increment_counts_from_zero() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.increment("c", TTL).await.unwrap(), 1);
        assert_eq!(cache.increment("c", TTL).await.unwrap(), 2);
        assert_eq!(cache.get("c").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let cache = InMemoryCache::new();
        cache.set("c", "abc", TTL).await.unwrap();
        assert!(matches!(
            cache.increment("c", TTL).await,
            Err(CacheError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_if_eq_only_removes_matching_value() {
        let cache = InMemoryCache::new();
        cache.set("lock", "token-a", TTL).await.unwrap();

        assert!(!cache.delete_if_eq("lock", "token-b").await.unwrap());
        assert!(cache.get("lock").await.unwrap().is_some());

        assert!(cache.delete_if_eq("lock", "token-a").await.unwrap());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let cache = InMemoryCache::new();
        let other = cache.clone();
        cache.set("k", "v", TTL).await.unwrap();
        assert_eq!(other.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(other.len().await, 1);
    }
}
