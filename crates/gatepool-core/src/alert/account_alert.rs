//! Alerts for accounts that another subsystem marked as erroring.

use chrono::{DateTime, SecondsFormat, Utc};
use gatepool_types::models::Account;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{AlertNotifier, AlertSink};
use crate::utils::text::{escape_inline_markdown, neutralize_code_fence, truncate_chars};

/// At most one alert per account within this window.
pub const ACCOUNT_ALERT_COOLDOWN: Duration = Duration::from_secs(5 * 60);
const MAX_REASON_CHARS: usize = 1500;

pub struct AccountAlertService {
    notifier: AlertNotifier,
    last_sent: Mutex<HashMap<i64, DateTime<Utc>>>,
}

impl AccountAlertService {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self::with_notifier(AlertNotifier::new(sink))
    }

    pub fn with_notifier(notifier: AlertNotifier) -> Self {
        Self { notifier, last_sent: Mutex::new(HashMap::new()) }
    }

    /// Alert that `account` entered an error state. Skipped when alerts are
    /// disabled or the account was alerted within [`ACCOUNT_ALERT_COOLDOWN`].
    pub fn notify_account_status_error(
        &self,
        account: &Account,
        source: &str,
        reason: &str,
        fields: &BTreeMap<String, String>,
    ) -> Option<JoinHandle<()>> {
        if !self.notifier.is_enabled() {
            return None;
        }
        let now = Utc::now();
        if !self.allow(account.id, now) {
            tracing::debug!(account_id = account.id, "Account alert suppressed by cooldown");
            return None;
        }
        let (title, text) = build_account_error_message(account, source, reason, fields, now);
        self.notifier.dispatch(account.id, title, text)
    }

    /// Claim the cooldown slot for `account_id` at `now`.
    pub(crate) fn allow(&self, account_id: i64, now: DateTime<Utc>) -> bool {
        if account_id <= 0 {
            return false;
        }
        let mut last_sent = self.last_sent.lock();
        if let Some(last) = last_sent.get(&account_id) {
            let elapsed = now.signed_duration_since(*last).to_std().unwrap_or_default();
            if elapsed < ACCOUNT_ALERT_COOLDOWN {
                return false;
            }
        }
        last_sent.insert(account_id, now);
        true
    }
}

/// `(title, markdown text)` for an account error alert.
///
/// Falls back to the account's stored error message when `reason` is blank.
pub fn build_account_error_message(
    account: &Account,
    source: &str,
    reason: &str,
    fields: &BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> (String, String) {
    let source = source.trim();
    let mut reason = reason.trim();
    if reason.is_empty() {
        reason = account.error_message.as_deref().map(str::trim).unwrap_or_default();
    }
    let reason = truncate_chars(&neutralize_code_fence(reason), MAX_REASON_CHARS);
    let name = account.display_name();

    let title = format!("Account Alert: {} (#{})", name, account.id);

    let mut text = String::from("### Account status error\n\n");
    let _ = writeln!(text, "- Time: {}", now.to_rfc3339_opts(SecondsFormat::Secs, true));
    if !source.is_empty() {
        let _ = writeln!(text, "- Source: {}", escape_inline_markdown(source));
    }
    let _ = writeln!(text, "- AccountID: {}", account.id);
    let _ = writeln!(text, "- Name: {}", escape_inline_markdown(name));
    let _ = writeln!(text, "- Platform: {}", account.platform);
    let _ = writeln!(text, "- Type: {}", account.account_type);
    let _ = writeln!(text, "- Status: {}", account.status);

    for (key, value) in fields {
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        let _ = writeln!(
            text,
            "- {}: {}",
            escape_inline_markdown(key),
            escape_inline_markdown(value)
        );
    }

    if !reason.is_empty() {
        let _ = write!(text, "\n**Reason**:\n```text\n{}\n```\n", reason);
    }
    (title, text)
}
