//! Dependency wiring for the monitor: storage, lock, prober, alerts.

use anyhow::{Context, Result};
use std::sync::Arc;

use gatepool_core::alert::{AlertNotifier, DingtalkSink};
use gatepool_core::modules::PostgresAccountRepository;
use gatepool_core::monitor::lock::{LeaderLock, LockStore, PgLockStore};
use gatepool_core::monitor::{AccountHealthMonitor, AccountProber, AnthropicApiKeyProber};
use gatepool_core::upstream::ReqwestUpstream;
use gatepool_types::models::{AppConfig, RunMode};

/// `hostname-pid-uuid`, unique per process.
pub fn instance_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}-{}-{}", host.trim(), std::process::id(), uuid::Uuid::new_v4())
}

/// Connect and migrate the account store. `None` without a database URL.
pub async fn connect_repository(config: &AppConfig) -> Result<Option<PostgresAccountRepository>> {
    let Some(url) = config.database_url.as_deref() else {
        return Ok(None);
    };
    let repository = PostgresAccountRepository::connect(url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    repository.run_migrations().await.context("Failed to run database migrations")?;
    tracing::info!("Connected to account database");
    Ok(Some(repository))
}

pub fn build_prober(config: &AppConfig) -> Arc<dyn AccountProber> {
    let upstream = Arc::new(ReqwestUpstream::new());
    Arc::new(AnthropicApiKeyProber::new(upstream, config))
}

/// Webhook notifier; falls back to a silent one when the sink cannot be built.
pub fn build_notifier(config: &AppConfig) -> AlertNotifier {
    if !config.dingtalk.is_enabled() {
        return AlertNotifier::disabled();
    }
    match DingtalkSink::new(config.dingtalk.clone()) {
        Ok(sink) => AlertNotifier::new(Arc::new(sink)),
        Err(e) => {
            tracing::warn!(error = %e, "Alert webhook unavailable, alerts disabled");
            AlertNotifier::disabled()
        },
    }
}

/// Build the monitor, or `None` when it is disabled or has no account store.
///
/// A disabled monitor never touches the database.
pub async fn build_monitor(config: &AppConfig) -> Result<Option<Arc<AccountHealthMonitor>>> {
    if !config.gateway.account_monitor.enabled {
        tracing::info!("Account monitor disabled by configuration");
        return Ok(None);
    }
    let Some(repository) = connect_repository(config).await? else {
        tracing::info!("No database configured, account monitor not available");
        return Ok(None);
    };

    let monitor_config = config.gateway.account_monitor.clone();
    let instance_id = instance_id();
    let lock = match config.run_mode {
        RunMode::Simple => LeaderLock::disabled(instance_id, &monitor_config),
        RunMode::Standard => {
            let store: Arc<dyn LockStore> = Arc::new(PgLockStore::new(repository.pool().clone()));
            LeaderLock::new(Some(store), instance_id, &monitor_config)
        },
    };

    Ok(Some(AccountHealthMonitor::new(
        monitor_config,
        Some(Arc::new(repository)),
        Some(build_prober(config)),
        lock,
        build_notifier(config),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_unique_and_shaped() {
        let a = instance_id();
        let b = instance_id();
        assert_ne!(a, b);
        assert!(a.contains(&format!("-{}-", std::process::id())));
    }

    #[tokio::test]
    async fn test_no_database_means_no_monitor() {
        let mut config = AppConfig::default();
        config.gateway.account_monitor.enabled = true;
        assert!(build_monitor(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disabled_monitor_skips_database() {
        let mut config = AppConfig::default();
        config.gateway.account_monitor.enabled = false;
        config.database_url = Some("postgres://nobody@127.0.0.1:1/unreachable".into());
        assert!(build_monitor(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enabled_monitor_surfaces_connect_error() {
        let mut config = AppConfig::default();
        config.gateway.account_monitor.enabled = true;
        config.database_url = Some("not a database url".into());
        assert!(build_monitor(&config).await.is_err());
    }

    #[test]
    fn test_notifier_disabled_without_webhook() {
        let mut config = AppConfig::default();
        config.dingtalk.enabled = true;
        assert!(!build_notifier(&config).is_enabled());
    }
}
