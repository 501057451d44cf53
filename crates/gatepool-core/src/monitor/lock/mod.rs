//! Fleet-wide leader election for the account monitor.
//!
//! One well-known key holds the instance ID of the current leader. Acquisition
//! is SETNX with TTL; the holder refreshes by re-checking ownership and
//! extending the TTL. Every store failure is treated as "not leader" so a
//! flaky store can never produce two writers, only zero.

mod postgres;
mod store;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gatepool_types::models::AccountMonitorConfig;

pub use postgres::PgLockStore;
pub use store::{LockStore, LockStoreError, MemoryLockStore};

use super::shutdown::Shutdown;

pub const LEADER_LOCK_KEY: &str = "gateway:scheduling:account_monitor:leader";

/// Bound for every individual lock-store call.
pub const LOCK_OP_TIMEOUT: Duration = Duration::from_secs(2);
const MIN_BASE_TTL: Duration = Duration::from_secs(120);
const BATCH_TTL_MARGIN: Duration = Duration::from_secs(30);

pub struct LeaderLock {
    store: Option<Arc<dyn LockStore>>,
    enabled: bool,
    key: String,
    instance_id: String,
    interval: Duration,
    request_timeout: Duration,
    max_concurrency: usize,
    warned_no_store: AtomicBool,
}

impl LeaderLock {
    /// Lock backed by `store`. With no store the instance always leads.
    pub fn new(
        store: Option<Arc<dyn LockStore>>,
        instance_id: impl Into<String>,
        config: &AccountMonitorConfig,
    ) -> Self {
        Self {
            store,
            enabled: true,
            key: LEADER_LOCK_KEY.to_string(),
            instance_id: instance_id.into(),
            interval: config.effective_interval(),
            request_timeout: config.effective_request_timeout(),
            max_concurrency: config.effective_max_concurrency(),
            warned_no_store: AtomicBool::new(false),
        }
    }

    /// Single-instance mode: no distributed lock at all.
    pub fn disabled(instance_id: impl Into<String>, config: &AccountMonitorConfig) -> Self {
        Self { enabled: false, ..Self::new(None, instance_id, config) }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn active_store(&self) -> Option<&Arc<dyn LockStore>> {
        if self.enabled {
            self.store.as_ref()
        } else {
            None
        }
    }

    /// `max(12 × interval, 2 min, 3 × request timeout)`.
    pub fn base_ttl(&self) -> Duration {
        (self.interval * 12).max(MIN_BASE_TTL).max(self.request_timeout * 3)
    }

    /// TTL covering a batch of `batch_size` probes: one request timeout per wave
    /// of `max_concurrency` probes plus a margin, never below [`Self::base_ttl`].
    pub fn ttl_for_batch(&self, batch_size: usize) -> Duration {
        let per_wave = self.max_concurrency.max(1);
        let waves = u32::try_from(batch_size.div_ceil(per_wave)).unwrap_or(u32::MAX);
        let estimate = self.request_timeout.saturating_mul(waves).saturating_add(BATCH_TTL_MARGIN);
        estimate.max(self.base_ttl())
    }

    /// Acquire the lock, or refresh it when already held. Fails closed.
    pub async fn acquire_or_refresh(&self, shutdown: &Shutdown) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(store) = self.store.as_ref() else {
            if !self.warned_no_store.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "No lock store configured, account monitor running without leader lock"
                );
            }
            return true;
        };

        let ttl = self.base_ttl();
        match bounded(shutdown, store.set_nx(&self.key, &self.instance_id, ttl)).await {
            Ok(true) => return true,
            Ok(false) => {},
            Err(e) => {
                tracing::warn!(error = %e, operation = "set_nx", "Leader lock acquire failed");
                return false;
            },
        }

        // Held by someone: refresh only if it is us.
        match bounded(shutdown, store.get(&self.key)).await {
            Ok(Some(holder)) if holder == self.instance_id => {},
            Ok(_) => return false,
            Err(e) => {
                tracing::warn!(error = %e, operation = "get", "Leader lock ownership check failed");
                return false;
            },
        }

        if let Err(e) = bounded(shutdown, store.expire(&self.key, ttl)).await {
            tracing::debug!(error = %e, operation = "expire", "Leader lock refresh failed");
        }
        true
    }

    /// Stretch the TTL before a probe batch, only while still the holder.
    pub async fn extend_ttl(&self, batch_size: usize, shutdown: &Shutdown) {
        if batch_size == 0 {
            return;
        }
        let Some(store) = self.active_store() else {
            return;
        };

        let ttl = self.ttl_for_batch(batch_size);
        match bounded(shutdown, store.get(&self.key)).await {
            Ok(Some(holder)) if holder == self.instance_id => {},
            Ok(_) => return,
            Err(e) => {
                tracing::debug!(error = %e, operation = "get", "Leader lock extend skipped");
                return;
            },
        }
        if let Err(e) = bounded(shutdown, store.expire(&self.key, ttl)).await {
            tracing::debug!(error = %e, operation = "expire", "Leader lock extend failed");
        }
    }

    /// Best-effort delete, only while still the holder. Ignores shutdown.
    pub async fn release(&self) {
        let Some(store) = self.active_store() else {
            return;
        };
        let never = Shutdown::never();

        match bounded(&never, store.get(&self.key)).await {
            Ok(Some(holder)) if holder == self.instance_id => {},
            _ => return,
        }
        match bounded(&never, store.del(&self.key)).await {
            Ok(_) => tracing::debug!("Leader lock released"),
            Err(e) => tracing::debug!(error = %e, operation = "del", "Leader lock release failed"),
        }
    }
}

async fn bounded<T, F>(shutdown: &Shutdown, op: F) -> Result<T, LockStoreError>
where
    F: std::future::Future<Output = Result<T, LockStoreError>>,
{
    match shutdown.run(tokio::time::timeout(LOCK_OP_TIMEOUT, op)).await {
        Some(Ok(result)) => result,
        Some(Err(_)) => Err(LockStoreError::Timeout(LOCK_OP_TIMEOUT)),
        None => Err(LockStoreError::Cancelled),
    }
}
