//! Account health monitor configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use validator::Validate;

pub const DEFAULT_INTERVAL_SECONDS: u64 = 10;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 6;
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 6;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 8;
pub const DEFAULT_MAX_CONCURRENCY: u32 = 4;
pub const MAX_CONCURRENCY_CAP: u32 = 64;

/// Background connectivity monitor for Anthropic API-key accounts.
///
/// When enabled, the monitor periodically performs a lightweight test request
/// against each account's upstream and:
/// - stops scheduling after `failure_threshold` consecutive failures
/// - resumes scheduling after `success_threshold` consecutive successes
///
/// Zero values fall back to the documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, Validate)]
pub struct AccountMonitorConfig {
    /// Enable the monitor (disabled by default)
    #[serde(default)]
    pub enabled: bool,
    /// Seconds between checks (default: 10)
    #[validate(range(max = 3600_u64))]
    #[serde(default)]
    pub interval_seconds: u64,
    /// Consecutive failures required to stop scheduling (default: 6)
    #[validate(range(max = 1000_u32))]
    #[serde(default)]
    pub failure_threshold: u32,
    /// Consecutive successes required to resume scheduling (default: 6)
    #[validate(range(max = 1000_u32))]
    #[serde(default)]
    pub success_threshold: u32,
    /// Bound for a single upstream test request in seconds (default: 8)
    #[validate(range(max = 600_u64))]
    #[serde(default)]
    pub request_timeout_seconds: u64,
    /// Concurrent upstream tests per cycle (default: 4, capped at 64)
    #[serde(default)]
    pub max_concurrency: u32,
    /// Model override for the test request; empty uses the built-in monitor model
    #[serde(default)]
    pub model_id: String,
    /// When non-empty, only these account IDs are monitored
    #[serde(default)]
    pub include_account_ids: Vec<i64>,
    /// Account IDs never monitored; wins over `include_account_ids`
    #[serde(default)]
    pub exclude_account_ids: Vec<i64>,
}

impl AccountMonitorConfig {
    pub fn effective_interval(&self) -> Duration {
        if self.interval_seconds > 0 {
            Duration::from_secs(self.interval_seconds)
        } else {
            Duration::from_secs(DEFAULT_INTERVAL_SECONDS)
        }
    }

    pub fn effective_failure_threshold(&self) -> u32 {
        if self.failure_threshold > 0 {
            self.failure_threshold
        } else {
            DEFAULT_FAILURE_THRESHOLD
        }
    }

    pub fn effective_success_threshold(&self) -> u32 {
        if self.success_threshold > 0 {
            self.success_threshold
        } else {
            DEFAULT_SUCCESS_THRESHOLD
        }
    }

    pub fn effective_request_timeout(&self) -> Duration {
        if self.request_timeout_seconds > 0 {
            Duration::from_secs(self.request_timeout_seconds)
        } else {
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS)
        }
    }

    pub fn effective_max_concurrency(&self) -> usize {
        let n = match self.max_concurrency {
            0 => DEFAULT_MAX_CONCURRENCY,
            n => n.min(MAX_CONCURRENCY_CAP),
        };
        n as usize
    }

    /// Trimmed model override, `None` when unset.
    pub fn effective_model_id(&self) -> Option<&str> {
        let model = self.model_id.trim();
        (!model.is_empty()).then_some(model)
    }

    /// Drop non-positive and duplicate IDs from both lists, keeping order.
    pub fn normalize(&mut self) {
        self.include_account_ids = normalize_ids(&self.include_account_ids);
        self.exclude_account_ids = normalize_ids(&self.exclude_account_ids);
    }
}

fn normalize_ids(values: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().copied().filter(|id| *id > 0 && seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_for_zero_values() {
        let config = AccountMonitorConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.effective_interval(), Duration::from_secs(10));
        assert_eq!(config.effective_failure_threshold(), 6);
        assert_eq!(config.effective_success_threshold(), 6);
        assert_eq!(config.effective_request_timeout(), Duration::from_secs(8));
        assert_eq!(config.effective_max_concurrency(), 4);
        assert_eq!(config.effective_model_id(), None);
    }

    #[test]
    fn test_max_concurrency_is_capped() {
        let config = AccountMonitorConfig { max_concurrency: 500, ..Default::default() };
        assert_eq!(config.effective_max_concurrency(), 64);

        let config = AccountMonitorConfig { max_concurrency: 12, ..Default::default() };
        assert_eq!(config.effective_max_concurrency(), 12);
    }

    #[test]
    fn test_model_override_trimmed() {
        let config = AccountMonitorConfig { model_id: "  claude-x  ".into(), ..Default::default() };
        assert_eq!(config.effective_model_id(), Some("claude-x"));

        let config = AccountMonitorConfig { model_id: "   ".into(), ..Default::default() };
        assert_eq!(config.effective_model_id(), None);
    }

    #[test]
    fn test_normalize_ids() {
        let mut config = AccountMonitorConfig {
            include_account_ids: vec![3, 0, 3, -1, 7, 5, 7],
            exclude_account_ids: vec![-5, 2, 2],
            ..Default::default()
        };
        config.normalize();
        assert_eq!(config.include_account_ids, vec![3, 7, 5]);
        assert_eq!(config.exclude_account_ids, vec![2]);
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let config = AccountMonitorConfig { interval_seconds: 7200, ..Default::default() };
        assert!(config.validate().is_err());

        let config = AccountMonitorConfig { interval_seconds: 30, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
