//! Key-value store seam for the leader lock.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, thiserror::Error)]
pub enum LockStoreError {
    #[error("lock store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("lock store operation cancelled")]
    Cancelled,
    #[error("lock store backend error: {0}")]
    Backend(String),
}

/// Minimal SETNX/GET/EXPIRE/DEL surface with per-key TTL.
///
/// Expired keys behave as absent in every operation.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` to `value` only if absent. Returns whether the key was set.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockStoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError>;

    /// Reset the TTL of an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LockStoreError>;

    /// Returns whether a key was removed.
    async fn del(&self, key: &str) -> Result<bool, LockStoreError>;
}

#[derive(Debug, Clone)]
struct LockEntry {
    value: String,
    expires_at: Instant,
}

/// In-process lock store. Shared between monitors in the same process only.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    entries: DashMap<String, LockEntry>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining TTL of a live key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }

    fn purge_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        let now = Instant::now();
        let fresh = LockEntry { value: value.to_string(), expires_at: now + ttl };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at <= now {
                    occupied.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            },
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError> {
        self.purge_expired(key);
        Ok(self.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        self.purge_expired(key);
        Ok(match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Instant::now() + ttl;
                true
            },
            None => false,
        })
    }

    async fn del(&self, key: &str) -> Result<bool, LockStoreError> {
        Ok(self.entries.remove(key).is_some())
    }
}
