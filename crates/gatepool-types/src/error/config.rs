//! Configuration-related errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// Config file not found at expected path
    #[error("Config not found: {path}")]
    NotFound {
        /// Filesystem path where config was expected
        path: String,
    },

    /// Config file could not be read
    #[error("Config read error: {message}")]
    ReadError {
        /// Description of the I/O failure
        message: String,
    },

    /// Config file parse error
    #[error("Config parse error: {message}")]
    ParseError {
        /// Description of the parse failure
        message: String,
    },

    /// Environment override could not be parsed
    #[error("Invalid environment override {var}: {message}")]
    InvalidEnv {
        /// Environment variable name
        var: String,
        /// Description of the parse failure
        message: String,
    },

    /// Config validation error (invalid values)
    #[error("Config validation error for {field}: {message}")]
    ValidationError {
        /// Name of the field that failed validation
        field: String,
        /// Description of the validation failure
        message: String,
    },
}

impl ConfigError {
    /// Create a parse error from a serde_json error.
    pub fn from_json_error(e: &serde_json::Error) -> Self {
        Self::ParseError { message: e.to_string() }
    }

    /// Create a read error from an IO error.
    pub fn from_io_error(e: &std::io::Error) -> Self {
        Self::ReadError { message: e.to_string() }
    }

    /// Create an environment override error.
    pub fn invalid_env(var: &str, message: impl Into<String>) -> Self {
        Self::InvalidEnv { var: var.to_string(), message: message.into() }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err =
            ConfigError::invalid_env("GATEWAY_ACCOUNT_MONITOR_INTERVAL_SECONDS", "not a number");

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("InvalidEnv"));
        assert!(json.contains("GATEWAY_ACCOUNT_MONITOR_INTERVAL_SECONDS"));

        let deserialized: ConfigError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::ValidationError {
            field: "dingtalk.webhook_url".to_string(),
            message: "must be a URL".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("dingtalk.webhook_url"));
        assert!(msg.contains("must be a URL"));
    }
}
