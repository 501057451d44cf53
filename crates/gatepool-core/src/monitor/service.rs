//! Monitor lifecycle and the per-tick control loop.

use chrono::{DateTime, Utc};
use gatepool_types::models::{Account, AccountMonitorConfig, Platform};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::lock::LeaderLock;
use super::probe::{AccountProber, ProbeResult};
use super::scheduler::{select_targets, ProbeScheduler};
use super::shutdown::Shutdown;
use super::state::{HealthStateMachine, Transition};
use crate::alert::{AlertNotifier, MonitorAlert};
use crate::modules::repository::AccountRepository;

/// Read-only view of the control loop, refreshed after every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorSnapshot {
    pub is_leader: bool,
    /// Accounts with live hysteresis state
    pub tracked_accounts: usize,
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Probes run in the last tick
    pub last_probed: usize,
    pub last_disabled: usize,
    pub last_recovered: usize,
    pub ticks: u64,
}

/// Background health monitor for the account pool.
///
/// `start` and `stop` are idempotent. A stopped monitor cannot be restarted.
pub struct AccountHealthMonitor {
    config: AccountMonitorConfig,
    repository: Option<Arc<dyn AccountRepository>>,
    prober: Option<Arc<dyn AccountProber>>,
    lock: Arc<LeaderLock>,
    notifier: AlertNotifier,
    shutdown_tx: watch::Sender<bool>,
    snapshot_tx: Arc<watch::Sender<MonitorSnapshot>>,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl AccountHealthMonitor {
    pub fn new(
        config: AccountMonitorConfig,
        repository: Option<Arc<dyn AccountRepository>>,
        prober: Option<Arc<dyn AccountProber>>,
        lock: LeaderLock,
        notifier: AlertNotifier,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let (snapshot_tx, _) = watch::channel(MonitorSnapshot::default());
        Arc::new(Self {
            config,
            repository,
            prober,
            lock: Arc::new(lock),
            notifier,
            shutdown_tx,
            snapshot_tx: Arc::new(snapshot_tx),
            task: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Spawn the control loop. Returns whether this call started it.
    ///
    /// Does nothing when disabled by config, when a dependency is missing, when
    /// already running, or after [`Self::stop`].
    pub fn start(self: &Arc<Self>) -> bool {
        if !self.config.enabled {
            tracing::info!("Account monitor disabled by configuration");
            return false;
        }
        if self.stopped.load(Ordering::SeqCst) {
            tracing::debug!("Account monitor already stopped, not starting");
            return false;
        }
        let Some(monitor_loop) = self.build_loop() else {
            tracing::warn!("Account monitor missing repository or prober, not starting");
            return false;
        };
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }

        let interval = self.config.effective_interval();
        tracing::info!(
            instance_id = %self.lock.instance_id(),
            interval = ?interval,
            failure_threshold = self.config.effective_failure_threshold(),
            success_threshold = self.config.effective_success_threshold(),
            max_concurrency = self.config.effective_max_concurrency(),
            "Account monitor started"
        );
        *self.task.lock() = Some(tokio::spawn(monitor_loop.run(interval)));
        true
    }

    /// Cancel the loop, wait for the in-flight tick, then release the lock.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown_tx.send_replace(true);

        let handle = self.task.lock().take();
        let Some(handle) = handle else {
            return;
        };
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "Account monitor task failed");
            }
        }
        self.lock.release().await;
        tracing::info!("Account monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub(crate) fn build_loop(&self) -> Option<MonitorLoop> {
        let repository = self.repository.clone()?;
        let prober = self.prober.clone()?;
        Some(MonitorLoop {
            config: self.config.clone(),
            repository,
            scheduler: ProbeScheduler::new(prober, self.config.effective_max_concurrency()),
            lock: self.lock.clone(),
            notifier: self.notifier.clone(),
            machine: HealthStateMachine::new(
                self.config.effective_failure_threshold(),
                self.config.effective_success_threshold(),
            ),
            is_leader: false,
            shutdown: Shutdown::new(self.shutdown_tx.subscribe()),
            snapshot_tx: self.snapshot_tx.clone(),
        })
    }
}

#[derive(Debug, Default)]
struct TickStats {
    probed: usize,
    disabled: usize,
    recovered: usize,
}

/// Owns all mutable monitor state. Runs on a single task; ticks never overlap.
pub(crate) struct MonitorLoop {
    config: AccountMonitorConfig,
    repository: Arc<dyn AccountRepository>,
    scheduler: ProbeScheduler,
    lock: Arc<LeaderLock>,
    notifier: AlertNotifier,
    machine: HealthStateMachine,
    is_leader: bool,
    shutdown: Shutdown,
    snapshot_tx: Arc<watch::Sender<MonitorSnapshot>>,
}

impl MonitorLoop {
    async fn run(mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }
        tracing::debug!("Account monitor loop exited");
    }

    /// One monitoring pass: leadership, selection, probing, then transitions.
    pub(crate) async fn tick(&mut self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let stats = self.tick_inner().await;
        self.publish(stats);
    }

    async fn tick_inner(&mut self) -> TickStats {
        let mut stats = TickStats::default();
        if !self.refresh_leadership().await {
            return stats;
        }

        let listing = self.repository.list_by_platform(Platform::Anthropic);
        let accounts = match self.shutdown.run(listing).await {
            Some(Ok(accounts)) => accounts,
            Some(Err(e)) => {
                tracing::warn!(
                    error = %e,
                    operation = "list_by_platform",
                    "Failed to list accounts"
                );
                return stats;
            },
            None => return stats,
        };

        let targets = select_targets(accounts, &self.config);
        if targets.is_empty() {
            self.machine.reset();
            return stats;
        }

        self.lock.extend_ttl(targets.len(), &self.shutdown).await;

        let now = Utc::now();
        let Some(results) = self.scheduler.run(&targets, &self.shutdown).await else {
            return stats;
        };
        stats.probed = results.len();

        let monitored: HashSet<i64> = targets.iter().map(|acc| acc.id).collect();
        self.machine.retain(&monitored);

        for (account, result) in results {
            match self.apply(account, &result, now).await {
                Some(Transition::Disable { .. }) => stats.disabled += 1,
                Some(Transition::Recover { .. }) => stats.recovered += 1,
                None => {},
            }
        }
        stats
    }

    /// Returns whether this instance leads for the current tick.
    async fn refresh_leadership(&mut self) -> bool {
        let leader = self.lock.acquire_or_refresh(&self.shutdown).await;
        if leader != self.is_leader {
            // Counters gathered under a different leader are not trustworthy.
            self.machine.reset();
            self.is_leader = leader;
            let instance_id = self.lock.instance_id();
            if leader {
                tracing::info!(%instance_id, "Account monitor leader acquired");
            } else {
                tracing::info!(%instance_id, "Account monitor leader lost");
            }
        }
        leader
    }

    /// Feed one result to the state machine and perform any due transition.
    async fn apply(
        &mut self,
        account: Account,
        result: &ProbeResult,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        let transition = self.machine.observe(&account, result, now)?;
        let account_id = account.id;

        if let Err(e) = self.repository.set_schedulable(account_id, transition.schedulable()).await
        {
            tracing::warn!(
                account_id,
                error = %e,
                operation = "set_schedulable",
                "Failed to update account schedulable flag"
            );
            return None;
        }

        let updates = transition.to_patch(now).to_extra_updates();
        if let Err(e) = self.repository.update_extra(account_id, &updates).await {
            tracing::warn!(
                account_id,
                error = %e,
                operation = "update_extra",
                "Failed to write monitor annotations"
            );
        }

        let alert = match &transition {
            Transition::Disable { threshold, reason } => {
                tracing::warn!(account_id, threshold, %reason, "Account scheduling stopped");
                MonitorAlert::Abnormal {
                    account,
                    threshold: *threshold,
                    reason: reason.clone(),
                    latency: result.latency,
                    at: now,
                }
            },
            Transition::Recover { threshold, .. } => {
                tracing::info!(account_id, threshold, "Account scheduling resumed");
                MonitorAlert::Recovered {
                    account,
                    threshold: *threshold,
                    latency: result.latency,
                    at: now,
                }
            },
        };
        self.notifier.notify(&alert);

        self.machine.commit(account_id, &transition);
        Some(transition)
    }

    fn publish(&self, stats: TickStats) {
        let is_leader = self.is_leader;
        let tracked_accounts = self.machine.len();
        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.is_leader = is_leader;
            snapshot.tracked_accounts = tracked_accounts;
            snapshot.last_tick_at = Some(Utc::now());
            snapshot.last_probed = stats.probed;
            snapshot.last_disabled = stats.disabled;
            snapshot.last_recovered = stats.recovered;
            snapshot.ticks += 1;
        });
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &HealthStateMachine {
        &self.machine
    }
}
