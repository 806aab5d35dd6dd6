//! Lease locks on top of the cache store
//!
//! Acquisition is a single set-if-absent attempt: a held lease fails fast with
//! [`LockError::Contention`] instead of queueing. Every lease has a TTL so a
//! crashed holder frees the resource on expiry. The lease value is a random
//! token and release only deletes a key that still holds that token.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::{CacheError, CacheStore};

/// Default lease lifetime
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Named resources that can be leased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Structural operations on one conversation (archive, restore, metadata)
    Conversation(Uuid),
    /// Serializes message creation within one conversation
    MessageCreation(Uuid),
    /// Concurrent edits of a single message
    Message {
        conversation_id: Uuid,
        message_id: Uuid,
    },
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversation(id) => write!(f, "conversation:{}", id),
            Self::MessageCreation(id) => write!(f, "message-creation:{}", id),
            Self::Message {
                conversation_id,
                message_id,
            } => write!(f, "message:{}:{}", conversation_id, message_id),
        }
    }
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Lock {key} is held by another operation")]
    Contention { key: LockKey },

    #[error("Lock store error: {0}")]
    Cache(#[from] CacheError),
}

/// Hands out leases from a shared cache store
#[derive(Clone)]
pub struct LockManager {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl LockManager {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Lease TTL from `LOCK_TTL_SECS`, defaulting to 30 seconds
    pub fn ttl_from_env() -> Duration {
        Duration::from_secs(thicode_common::config::env_parse(
            "LOCK_TTL_SECS",
            DEFAULT_LOCK_TTL.as_secs(),
        ))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try once to lease `key` for the configured TTL
    pub async fn acquire(&self, key: LockKey) -> Result<LockGuard, LockError> {
        self.acquire_with_ttl(key, self.ttl).await
    }

    /// Try once to lease `key` for `ttl`
    pub async fn acquire_with_ttl(
        &self,
        key: LockKey,
        ttl: Duration,
    ) -> Result<LockGuard, LockError> {
        let cache_key = key.to_string();
        let token = Uuid::new_v4().to_string();

        if !self.cache.add(&cache_key, &token, ttl).await? {
            tracing::debug!(lock = %cache_key, "Lock contention");
            return Err(LockError::Contention { key });
        }

        tracing::debug!(lock = %cache_key, ttl_ms = ttl.as_millis() as u64, "Lock acquired");

        Ok(LockGuard {
            cache: self.cache.clone(),
            key,
            cache_key,
            token,
            released: false,
        })
    }

    /// Run `f` while holding `key`; the lease is released whether `f`
    /// succeeds or fails.
    pub async fn with_lock<T, E, F, Fut>(&self, key: LockKey, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let guard = self.acquire(key).await?;
        let result = f().await;
        if let Err(e) = guard.release().await {
            tracing::warn!(lock = %key, error = %e, "Failed to release lock; it will expire by TTL");
        }
        result
    }
}

/// A held lease. Dropping the guard without calling [`LockGuard::release`]
/// schedules the release on the current runtime.
pub struct LockGuard {
    cache: Arc<dyn CacheStore>,
    key: LockKey,
    cache_key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> LockKey {
        self.key
    }

    /// Release the lease. Returns `false` when it had already expired and
    /// possibly been taken by someone else, in which case nothing is deleted.
    pub async fn release(mut self) -> Result<bool, LockError> {
        self.released = true;
        let deleted = self.cache.delete_if_eq(&self.cache_key, &self.token).await?;
        if deleted {
            tracing::debug!(lock = %self.cache_key, "Lock released");
        } else {
            tracing::warn!(lock = %self.cache_key, "Lock expired before release");
        }
        Ok(deleted)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let cache = self.cache.clone();
        let cache_key = std::mem::take(&mut self.cache_key);
        let token = std::mem::take(&mut self.token);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = cache.delete_if_eq(&cache_key, &token).await {
                        tracing::warn!(lock = %cache_key, error = %e, "Deferred lock release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(lock = %cache_key, "No runtime to release lock; it will expire by TTL");
            }
        }
    }
}
