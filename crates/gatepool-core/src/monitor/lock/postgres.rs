//! PostgreSQL-backed lock store (`leader_locks` table).

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use std::time::Duration;

use super::store::{LockStore, LockStoreError};

/// One row per key with an absolute expiry; expired rows count as absent.
pub struct PgLockStore {
    pool: PgPool,
}

impl PgLockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_err(err: sqlx::Error) -> LockStoreError {
    LockStoreError::Backend(err.to_string())
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        // Takes over only rows that have already expired.
        let row = sqlx::query(
            "INSERT INTO leader_locks (key, holder, expires_at) \
             VALUES ($1, $2, now() + make_interval(secs => $3)) \
             ON CONFLICT (key) DO UPDATE \
                 SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at \
                 WHERE leader_locks.expires_at <= now() \
             RETURNING holder",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT holder FROM leader_locks WHERE key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        let result = sqlx::query(
            "UPDATE leader_locks SET expires_at = now() + make_interval(secs => $2) \
             WHERE key = $1 AND expires_at > now()",
        )
        .bind(key)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn del(&self, key: &str) -> Result<bool, LockStoreError> {
        let result = sqlx::query("DELETE FROM leader_locks WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }
}
