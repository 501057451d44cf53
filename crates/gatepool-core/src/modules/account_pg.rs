//! PostgreSQL implementation of the account repository.

use async_trait::async_trait;
use gatepool_types::models::{Account, Platform};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::modules::account_pg_helpers::{map_sqlx_err, row_to_account, split_extra_updates};
use crate::modules::repository::{AccountRepository, RepoResult, RepositoryError};

const ACCOUNT_COLUMNS: &str = "id, name, platform, type, status, schedulable, concurrency, \
     credentials, extra, proxy_url, error_message";

/// PostgreSQL-backed account repository.
pub struct PostgresAccountRepository {
    /// Database connection pool.
    pool: PgPool,
}

impl PostgresAccountRepository {
    /// Create repository with existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connect to database and create repository.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(300))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> RepoResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| RepositoryError::Database(err.to_string()))
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn list_by_platform(&self, platform: Platform) -> RepoResult<Vec<Account>> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE platform = $1 AND deleted_at IS NULL ORDER BY id"
        );
        let rows = sqlx::query(&query)
            .bind(platform.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        rows.iter().map(row_to_account).collect()
    }

    async fn set_schedulable(&self, account_id: i64, schedulable: bool) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE accounts SET schedulable = $2, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(account_id)
        .bind(schedulable)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(account_id));
        }
        Ok(())
    }

    async fn update_extra(&self, account_id: i64, updates: &Map<String, Value>) -> RepoResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let (set, remove) = split_extra_updates(updates);

        // Single statement: merge set keys, then strip removed keys.
        let result = sqlx::query(
            "UPDATE accounts \
             SET extra = (COALESCE(extra, '{}'::jsonb) || $2::jsonb) - $3::text[], \
                 updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(account_id)
        .bind(Value::Object(set))
        .bind(remove)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(account_id));
        }
        Ok(())
    }
}
