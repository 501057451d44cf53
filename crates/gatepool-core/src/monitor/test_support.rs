//! In-memory fakes for monitor tests.

use async_trait::async_trait;
use bytes::Bytes;
use gatepool_types::models::annotations::AUTO_DISABLED_KEY;
use gatepool_types::models::{merge_extra, Account, AccountType, Platform};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::lock::{LockStore, LockStoreError};
use super::probe::{AccountProber, ProbeResult};
use crate::alert::{AlertError, AlertSink};
use crate::modules::repository::{AccountRepository, RepoResult, RepositoryError};
use crate::upstream::{
    HttpUpstream, UpstreamError, UpstreamRequest, UpstreamResponse, UpstreamTarget,
};

pub fn account(id: i64, platform: Platform, account_type: AccountType) -> Account {
    let mut account = Account::new(id, format!("acc-{}", id), platform, account_type);
    account.credentials.insert("api_key".to_string(), Value::String(format!("sk-test-{}", id)));
    account
}

/// Active, schedulable Anthropic API-key account with an `api_key`.
pub fn anthropic_account(id: i64) -> Account {
    account(id, Platform::Anthropic, AccountType::ApiKey)
}

/// The account as the monitor leaves it after disabling it.
pub fn auto_disabled(mut account: Account) -> Account {
    account.schedulable = false;
    account.extra.insert(AUTO_DISABLED_KEY.to_string(), Value::Bool(true));
    account
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRepository {
    accounts: Mutex<BTreeMap<i64, Account>>,
    schedulable_writes: Mutex<Vec<(i64, bool)>>,
    extra_writes: Mutex<Vec<(i64, Map<String, Value>)>>,
    list_calls: AtomicUsize,
    pub fail_list: AtomicBool,
    pub fail_set_schedulable: AtomicBool,
    pub fail_update_extra: AtomicBool,
}

impl FakeRepository {
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Arc<Self> {
        let repo = Self::default();
        repo.accounts.lock().extend(accounts.into_iter().map(|a| (a.id, a)));
        Arc::new(repo)
    }

    pub fn get(&self, id: i64) -> Option<Account> {
        self.accounts.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: i64) {
        self.accounts.lock().remove(&id);
    }

    pub fn schedulable_writes(&self) -> Vec<(i64, bool)> {
        self.schedulable_writes.lock().clone()
    }

    pub fn extra_writes(&self) -> Vec<(i64, Map<String, Value>)> {
        self.extra_writes.lock().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountRepository for FakeRepository {
    async fn list_by_platform(&self, platform: Platform) -> RepoResult<Vec<Account>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database("list unavailable".to_string()));
        }
        Ok(self.accounts.lock().values().filter(|a| a.platform == platform).cloned().collect())
    }

    async fn set_schedulable(&self, account_id: i64, schedulable: bool) -> RepoResult<()> {
        if self.fail_set_schedulable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database("write unavailable".to_string()));
        }
        let mut accounts = self.accounts.lock();
        let account = accounts.get_mut(&account_id).ok_or(RepositoryError::NotFound(account_id))?;
        account.schedulable = schedulable;
        self.schedulable_writes.lock().push((account_id, schedulable));
        Ok(())
    }

    async fn update_extra(&self, account_id: i64, updates: &Map<String, Value>) -> RepoResult<()> {
        if self.fail_update_extra.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database("extra unavailable".to_string()));
        }
        let mut accounts = self.accounts.lock();
        let account = accounts.get_mut(&account_id).ok_or(RepositoryError::NotFound(account_id))?;
        merge_extra(&mut account.extra, updates);
        self.extra_writes.lock().push((account_id, updates.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Prober
// ---------------------------------------------------------------------------

/// Prober whose per-account outcome is set by the test. Healthy by default.
#[derive(Default)]
pub struct ScriptedProber {
    failures: Mutex<HashMap<i64, String>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Builder for a prober that sleeps `delay` inside every probe.
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        let failures = self.failures.lock().clone();
        Arc::new(Self { failures: Mutex::new(failures), delay, ..Self::default() })
    }

    pub fn fail(&self, id: i64, message: &str) {
        self.failures.lock().insert(id, message.to_string());
    }

    pub fn heal(&self, id: i64) {
        self.failures.lock().remove(&id);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountProber for ScriptedProber {
    async fn probe(&self, account: &Account) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let latency = Duration::from_millis(10);
        match self.failures.lock().get(&account.id) {
            Some(message) => ProbeResult::failure(account.id, message, latency),
            None => ProbeResult::success(account.id, latency),
        }
    }
}

// ---------------------------------------------------------------------------
// Alert sink
// ---------------------------------------------------------------------------

pub struct RecordingSink {
    enabled: bool,
    fail: bool,
    attempts: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    fn build(enabled: bool, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            enabled,
            fail,
            attempts: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn new() -> Arc<Self> {
        Self::build(true, false)
    }

    pub fn disabled() -> Arc<Self> {
        Self::build(false, false)
    }

    pub fn failing() -> Arc<Self> {
        Self::build(true, true)
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send_markdown(&self, title: &str, text: &str) -> Result<(), AlertError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AlertError::Status(500));
        }
        self.sent.lock().push((title.to_string(), text.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lock store
// ---------------------------------------------------------------------------

/// Every operation errors.
pub struct FailingLockStore;

#[async_trait]
impl LockStore for FailingLockStore {
    async fn set_nx(&self, _: &str, _: &str, _: Duration) -> Result<bool, LockStoreError> {
        Err(LockStoreError::Backend("store down".to_string()))
    }

    async fn get(&self, _: &str) -> Result<Option<String>, LockStoreError> {
        Err(LockStoreError::Backend("store down".to_string()))
    }

    async fn expire(&self, _: &str, _: Duration) -> Result<bool, LockStoreError> {
        Err(LockStoreError::Backend("store down".to_string()))
    }

    async fn del(&self, _: &str) -> Result<bool, LockStoreError> {
        Err(LockStoreError::Backend("store down".to_string()))
    }
}

/// Store whose calls never complete.
pub struct HangingLockStore;

#[async_trait]
impl LockStore for HangingLockStore {
    async fn set_nx(&self, _: &str, _: &str, _: Duration) -> Result<bool, LockStoreError> {
        std::future::pending().await
    }

    async fn get(&self, _: &str) -> Result<Option<String>, LockStoreError> {
        std::future::pending().await
    }

    async fn expire(&self, _: &str, _: Duration) -> Result<bool, LockStoreError> {
        std::future::pending().await
    }

    async fn del(&self, _: &str) -> Result<bool, LockStoreError> {
        std::future::pending().await
    }
}

// ---------------------------------------------------------------------------
// Upstream
// ---------------------------------------------------------------------------

enum StubReply {
    Status(u16, &'static str),
    Fail(&'static str),
    Hang,
}

/// Canned upstream that records every call.
pub struct StubUpstream {
    reply: StubReply,
    calls: Mutex<Vec<(UpstreamRequest, UpstreamTarget)>>,
}

impl StubUpstream {
    fn build(reply: StubReply) -> Arc<Self> {
        Arc::new(Self { reply, calls: Mutex::new(Vec::new()) })
    }

    /// 200 with the given SSE body.
    pub fn sse(body: &'static str) -> Arc<Self> {
        Self::build(StubReply::Status(200, body))
    }

    pub fn status(status: u16, body: &'static str) -> Arc<Self> {
        Self::build(StubReply::Status(status, body))
    }

    pub fn failing(message: &'static str) -> Arc<Self> {
        Self::build(StubReply::Fail(message))
    }

    pub fn hanging() -> Arc<Self> {
        Self::build(StubReply::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last_call(&self) -> Option<(UpstreamRequest, UpstreamTarget)> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl HttpUpstream for StubUpstream {
    async fn send(
        &self,
        request: UpstreamRequest,
        target: &UpstreamTarget,
        _timeout: Duration,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.calls.lock().push((request, target.clone()));
        match self.reply {
            StubReply::Status(status, body) => {
                Ok(UpstreamResponse::from_bytes(status, Bytes::from_static(body.as_bytes())))
            },
            StubReply::Fail(message) => Err(UpstreamError::Request(message.to_string())),
            StubReply::Hang => std::future::pending().await,
        }
    }
}
