//! Target selection and bounded-concurrency probe batches.

use gatepool_types::models::{Account, AccountMonitorConfig, AccountType, Platform};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::probe::{AccountProber, ProbeResult};
use super::shutdown::Shutdown;

/// Accounts the monitor should probe this tick, in input order.
///
/// Anthropic API-key accounts in `active` status, narrowed to the include list
/// when it is non-empty; the exclude list always wins. Accounts that are
/// already unschedulable stay in the set so they can recover.
pub fn select_targets(accounts: Vec<Account>, config: &AccountMonitorConfig) -> Vec<Account> {
    let include: HashSet<i64> = config.include_account_ids.iter().copied().collect();
    let exclude: HashSet<i64> = config.exclude_account_ids.iter().copied().collect();

    accounts
        .into_iter()
        .filter(|acc| acc.platform == Platform::Anthropic)
        .filter(|acc| acc.account_type == AccountType::ApiKey)
        .filter(Account::is_active)
        .filter(|acc| include.is_empty() || include.contains(&acc.id))
        .filter(|acc| !exclude.contains(&acc.id))
        .collect()
}

/// Runs one probe per account with at most `max_concurrency` in flight.
pub struct ProbeScheduler {
    prober: Arc<dyn AccountProber>,
    max_concurrency: usize,
}

impl ProbeScheduler {
    pub fn new(prober: Arc<dyn AccountProber>, max_concurrency: usize) -> Self {
        Self { prober, max_concurrency: max_concurrency.max(1) }
    }

    /// Probe every target and return results in target order.
    ///
    /// Each worker gets its own clone of the account. Returns `None` when
    /// shutdown interrupts the batch; in-flight probes are aborted.
    pub async fn run(
        &self,
        targets: &[Account],
        shutdown: &Shutdown,
    ) -> Option<Vec<(Account, ProbeResult)>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set: JoinSet<Option<(usize, Account, ProbeResult)>> = JoinSet::new();

        for (index, account) in targets.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let prober = self.prober.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let result = prober.probe(&account).await;
                Some((index, account, result))
            });
        }

        let drain = async {
            let mut results = Vec::with_capacity(targets.len());
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(Some(entry)) => results.push(entry),
                    Ok(None) => {},
                    Err(e) => tracing::error!(error = %e, "Account probe task failed"),
                }
            }
            results
        };

        let Some(mut results) = shutdown.run(drain).await else {
            join_set.abort_all();
            return None;
        };
        results.sort_by_key(|(index, _, _)| *index);
        Some(results.into_iter().map(|(_, account, result)| (account, result)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::test_support::{account, anthropic_account, ScriptedProber};
    use gatepool_types::models::AccountStatus;
    use std::time::Duration;
    use tokio::sync::watch;

    fn ids(accounts: &[Account]) -> Vec<i64> {
        accounts.iter().map(|a| a.id).collect()
    }

    fn fleet() -> Vec<Account> {
        let mut disabled = anthropic_account(4);
        disabled.status = AccountStatus::Disabled;
        vec![
            anthropic_account(1),
            account(2, Platform::Anthropic, AccountType::OAuth),
            account(3, Platform::OpenAi, AccountType::ApiKey),
            disabled,
            anthropic_account(5),
        ]
    }

    #[test]
    fn test_select_default() {
        let targets = select_targets(fleet(), &AccountMonitorConfig::default());
        assert_eq!(ids(&targets), vec![1, 5]);
    }

    #[test]
    fn test_select_include_ids() {
        let config =
            AccountMonitorConfig { include_account_ids: vec![2, 5, 999], ..Default::default() };
        assert_eq!(ids(&select_targets(fleet(), &config)), vec![5]);
    }

    #[test]
    fn test_select_exclude_ids() {
        let config = AccountMonitorConfig { exclude_account_ids: vec![1], ..Default::default() };
        assert_eq!(ids(&select_targets(fleet(), &config)), vec![5]);
    }

    #[test]
    fn test_select_exclude_wins_over_include() {
        let config = AccountMonitorConfig {
            include_account_ids: vec![1, 5],
            exclude_account_ids: vec![5],
            ..Default::default()
        };
        assert_eq!(ids(&select_targets(fleet(), &config)), vec![1]);
    }

    #[test]
    fn test_select_keeps_unschedulable() {
        let mut paused = anthropic_account(9);
        paused.schedulable = false;
        let targets = select_targets(vec![paused], &AccountMonitorConfig::default());
        assert_eq!(ids(&targets), vec![9]);
    }

    #[tokio::test]
    async fn test_run_bounds_concurrency_and_keeps_order() {
        let prober = ScriptedProber::new().with_delay(Duration::from_millis(20));
        let scheduler = ProbeScheduler::new(prober.clone(), 3);
        let targets: Vec<Account> = (1..=10).map(anthropic_account).collect();

        let results = scheduler.run(&targets, &Shutdown::never()).await.unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(results.iter().map(|(a, _)| a.id).collect::<Vec<_>>(), ids(&targets));
        assert!(results.iter().all(|(a, r)| a.id == r.account_id && r.success));
        assert!(prober.max_in_flight() <= 3, "max in flight {}", prober.max_in_flight());
        assert!(prober.max_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_run_empty_batch() {
        let scheduler = ProbeScheduler::new(ScriptedProber::new(), 4);
        let results = scheduler.run(&[], &Shutdown::never()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_aborts_batch() {
        let prober = ScriptedProber::new().with_delay(Duration::from_secs(30));
        let scheduler = ProbeScheduler::new(prober, 2);
        let (tx, rx) = watch::channel(false);
        let shutdown = Shutdown::new(rx);
        let targets: Vec<Account> = (1..=4).map(anthropic_account).collect();

        let run = scheduler.run(&targets, &shutdown);
        let stop = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(true).unwrap();
        };
        let (results, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(run, stop)
        })
        .await
        .unwrap();
        assert!(results.is_none());
    }
}
