//! Helper functions for PostgreSQL account operations.

use gatepool_types::models::{Account, AccountStatus, AccountType, Platform};
use serde_json::{Map, Value};
use sqlx::Row;

use crate::modules::repository::{RepoResult, RepositoryError};

/// Convert a PostgreSQL row to an Account struct.
pub(crate) fn row_to_account(row: &sqlx::postgres::PgRow) -> RepoResult<Account> {
    let id: i64 = row.get("id");

    let platform_raw: String = row.get("platform");
    let platform = Platform::from_string(&platform_raw).ok_or_else(|| {
        RepositoryError::Serialization(format!("account {id}: unknown platform '{platform_raw}'"))
    })?;

    let type_raw: String = row.get("type");
    let account_type = AccountType::from_string(&type_raw).ok_or_else(|| {
        RepositoryError::Serialization(format!("account {id}: unknown type '{type_raw}'"))
    })?;

    let status_raw: String = row.get("status");
    let concurrency: i32 = row.get("concurrency");

    Ok(Account {
        id,
        name: row.get("name"),
        platform,
        account_type,
        status: AccountStatus::from_string(&status_raw),
        schedulable: row.get("schedulable"),
        concurrency: u32::try_from(concurrency).unwrap_or(0),
        credentials: json_object(row.get("credentials"), id, "credentials")?,
        extra: json_object(row.get("extra"), id, "extra")?,
        proxy_url: row.get("proxy_url"),
        error_message: row.get("error_message"),
    })
}

fn json_object(value: Value, id: i64, column: &str) -> RepoResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(RepositoryError::Serialization(format!(
            "account {id}: {column} is not an object: {other}"
        ))),
    }
}

/// Split an `extra` patch into keys to set and keys to remove.
pub(crate) fn split_extra_updates(
    updates: &Map<String, Value>,
) -> (Map<String, Value>, Vec<String>) {
    let mut set = Map::new();
    let mut remove = Vec::new();
    for (key, value) in updates {
        if value.is_null() {
            remove.push(key.clone());
        } else {
            set.insert(key.clone(), value.clone());
        }
    }
    (set, remove)
}

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::Database(err.to_string())
}
