//! Account repository trait for storage abstraction.

use async_trait::async_trait;
use gatepool_types::models::{Account, Platform};
use serde_json::{Map, Value};

pub type RepoResult<T> = Result<T, RepositoryError>;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Account not found: {0}")]
    NotFound(i64),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Account storage as seen by the health monitor.
///
/// `set_schedulable` and `update_extra` are independent single-field writes.
/// Callers must tolerate one succeeding while the other fails.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// All accounts on a platform, any status.
    async fn list_by_platform(&self, platform: Platform) -> RepoResult<Vec<Account>>;

    async fn set_schedulable(&self, account_id: i64, schedulable: bool) -> RepoResult<()>;

    /// Merge `updates` into the account's `extra` bag. A `null` value removes the key.
    async fn update_extra(&self, account_id: i64, updates: &Map<String, Value>) -> RepoResult<()>;
}
