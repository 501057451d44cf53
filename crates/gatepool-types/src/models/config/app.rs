//! Application-level configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use super::alert::DingtalkConfig;
use super::monitor::AccountMonitorConfig;
use super::security::SecurityConfig;

/// Deployment mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Multi-instance deployment with a shared leader lock
    #[default]
    Standard,
    /// Single instance; the distributed lock is disabled
    Simple,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Standard => write!(f, "standard"),
            Self::Simple => write!(f, "simple"),
        }
    }
}

impl RunMode {
    /// Parse from string. Anything other than `simple` is standard.
    pub fn from_string(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Self::Simple,
            _ => Self::Standard,
        }
    }
}

/// Gateway behavior shared by the relay path and the monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, Validate)]
pub struct GatewayConfig {
    /// Use the fingerprinted TLS client profile for upstream requests
    #[serde(default)]
    pub tls_fingerprint_enabled: bool,
    /// Account health monitor
    #[serde(default)]
    #[validate(nested)]
    pub account_monitor: AccountMonitorConfig,
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, Validate)]
pub struct AppConfig {
    #[serde(default)]
    pub run_mode: RunMode,
    /// PostgreSQL connection string for the account store and leader lock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    #[validate(nested)]
    pub security: SecurityConfig,
    #[serde(default)]
    #[validate(nested)]
    pub dingtalk: DingtalkConfig,
}

impl AppConfig {
    /// Copy with credentials replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.database_url.is_some() {
            copy.database_url = Some(REDACTED.to_string());
        }
        if !copy.dingtalk.secret.is_empty() {
            copy.dingtalk.secret = REDACTED.to_string();
        }
        if copy.dingtalk.webhook_url.is_some() {
            copy.dingtalk.webhook_url = Some(REDACTED.to_string());
        }
        copy
    }
}

const REDACTED: &str = "***";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: AppConfig = serde_json::from_str("{}").expect("parse empty config");
        assert_eq!(config.run_mode, RunMode::Standard);
        assert!(!config.gateway.account_monitor.enabled);
        assert!(config.database_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nested_sections_parse() {
        let raw = r#"{
            "run_mode": "simple",
            "gateway": {
                "tls_fingerprint_enabled": true,
                "account_monitor": {"enabled": true, "failure_threshold": 3}
            }
        }"#;
        let config: AppConfig = serde_json::from_str(raw).expect("parse config");
        assert_eq!(config.run_mode, RunMode::Simple);
        assert!(config.gateway.tls_fingerprint_enabled);
        assert_eq!(config.gateway.account_monitor.effective_failure_threshold(), 3);
        assert_eq!(config.gateway.account_monitor.effective_success_threshold(), 6);
    }

    #[test]
    fn test_nested_validation_propagates() {
        let mut config = AppConfig::default();
        config.gateway.account_monitor.request_timeout_seconds = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = AppConfig {
            database_url: Some("postgres://user:pw@db/gatepool".to_string()),
            ..Default::default()
        };
        config.dingtalk.secret = "SEC123".to_string();
        let shown = config.redacted();
        assert_eq!(shown.database_url.as_deref(), Some("***"));
        assert_eq!(shown.dingtalk.secret, "***");
        assert!(shown.dingtalk.webhook_url.is_none());
    }

    #[test]
    fn test_run_mode_from_string() {
        assert_eq!(RunMode::from_string(" Simple "), RunMode::Simple);
        assert_eq!(RunMode::from_string("cluster"), RunMode::Standard);
        assert_eq!(RunMode::Simple.to_string(), "simple");
    }
}
