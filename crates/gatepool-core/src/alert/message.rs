use chrono::{DateTime, SecondsFormat, Utc};
use gatepool_types::models::Account;
use std::fmt::Write;
use std::time::Duration;

use crate::utils::text::{escape_inline_code, neutralize_code_fence, truncate_chars};

const MAX_ALERT_REASON_CHARS: usize = 1500;

/// A schedulable-flag transition worth telling an operator about.
#[derive(Debug, Clone)]
pub enum MonitorAlert {
    /// Scheduling was stopped after `threshold` consecutive failures.
    Abnormal {
        account: Account,
        threshold: u32,
        reason: String,
        latency: Duration,
        at: DateTime<Utc>,
    },
    /// Scheduling resumed after `threshold` consecutive successes.
    Recovered { account: Account, threshold: u32, latency: Duration, at: DateTime<Utc> },
}

impl MonitorAlert {
    pub fn account_id(&self) -> i64 {
        match self {
            Self::Abnormal { account, .. } | Self::Recovered { account, .. } => account.id,
        }
    }

    /// `(title, markdown text)`.
    pub fn render(&self) -> (String, String) {
        match self {
            Self::Abnormal { account, threshold, reason, latency, at } => {
                let title = format!(
                    "Account alert: scheduling stopped {} (#{})",
                    account.display_name(),
                    account.id
                );
                let mut text = String::from(
                    "### [Account alert] Anthropic API-key account unreachable, \
                     scheduling stopped\n\n",
                );
                write_fields(&mut text, account, "Consecutive failures", *threshold, *latency, at);

                let reason = reason.trim();
                if !reason.is_empty() {
                    let reason =
                        truncate_chars(&neutralize_code_fence(reason), MAX_ALERT_REASON_CHARS);
                    let _ = write!(text, "\n\n**Reason**\n```text\n{}\n```\n", reason);
                }
                (title, text)
            },
            Self::Recovered { account, threshold, latency, at } => {
                let title = format!(
                    "Account recovered: scheduling resumed {} (#{})",
                    account.display_name(),
                    account.id
                );
                let mut text = String::from(
                    "### [Account recovered] Anthropic API-key account reachable again, \
                     scheduling resumed\n\n",
                );
                write_fields(&mut text, account, "Consecutive successes", *threshold, *latency, at);
                (title, text)
            },
        }
    }
}

fn write_fields(
    text: &mut String,
    account: &Account,
    counter_label: &str,
    threshold: u32,
    latency: Duration,
    at: &DateTime<Utc>,
) {
    let _ = write!(
        text,
        "**Account**: `{}` (#{})  \n\
         **Platform**: `{}`  \n\
         **Type**: `{}`  \n\
         **{}**: `{}`  \n\
         **Latency**: `{:?}`  \n\
         **Time**: `{}`  \n",
        escape_inline_code(account.display_name()),
        account.id,
        escape_inline_code(account.platform.as_str()),
        escape_inline_code(account.account_type.as_str()),
        counter_label,
        threshold,
        latency,
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
}
