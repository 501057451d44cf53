//! Unified error type for gatepool core.

use gatepool_types::ConfigError;
use serde::Serialize;
use thiserror::Error;

use crate::alert::AlertError;
use crate::modules::repository::RepositoryError;
use crate::monitor::lock::LockStoreError;
use crate::upstream::UpstreamError;

/// Aggregate error for callers that cross several boundaries.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    /// Account repository failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Leader lock store failed.
    #[error("Lock store error: {0}")]
    LockStore(#[from] LockStoreError),

    /// Upstream transport failed.
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Alert delivery failed.
    #[error("Alert error: {0}")]
    Alert(#[from] AlertError),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection could not be established.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

/// Result type alias for gatepool core operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_and_display() {
        let err: AppError = RepositoryError::NotFound(42).into();
        assert_eq!(err.to_string(), "Repository error: Account not found: 42");

        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Repository error: Account not found: 42\"");
    }
}
