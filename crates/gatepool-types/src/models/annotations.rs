//! Audit annotations written by the account health monitor.
//!
//! The annotations live in the account's open `extra` bag under a fixed set of
//! keys. `auto_disabled` is the only marker that distinguishes a disable made by
//! the monitor from one made by an operator or another subsystem; automatic
//! recovery is gated on it.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const AUTO_DISABLED_KEY: &str = "account_monitor_auto_disabled";
pub const DISABLED_AT_KEY: &str = "account_monitor_disabled_at";
pub const DISABLED_REASON_KEY: &str = "account_monitor_disabled_reason";
pub const RECOVERED_AT_KEY: &str = "account_monitor_recovered_at";
pub const RECOVERED_REASON_KEY: &str = "account_monitor_recovered_reason";

/// Typed view of the monitor's audit fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorAnnotations {
    pub auto_disabled: bool,
    pub disabled_at: Option<DateTime<Utc>>,
    pub disabled_reason: Option<String>,
    pub recovered_at: Option<DateTime<Utc>>,
    pub recovered_reason: Option<String>,
}

impl MonitorAnnotations {
    /// Read the annotations from an `extra` bag.
    ///
    /// Only a literal JSON `true` counts as auto-disabled. Malformed timestamps
    /// are ignored rather than rejected.
    pub fn from_extra(extra: &Map<String, Value>) -> Self {
        Self {
            auto_disabled: matches!(extra.get(AUTO_DISABLED_KEY), Some(Value::Bool(true))),
            disabled_at: read_timestamp(extra, DISABLED_AT_KEY),
            disabled_reason: read_string(extra, DISABLED_REASON_KEY),
            recovered_at: read_timestamp(extra, RECOVERED_AT_KEY),
            recovered_reason: read_string(extra, RECOVERED_REASON_KEY),
        }
    }
}

fn read_string(extra: &Map<String, Value>, key: &str) -> Option<String> {
    extra.get(key).and_then(Value::as_str).map(str::to_string)
}

fn read_timestamp(extra: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    extra
        .get(key)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// A partial update of the audit fields, produced on a monitor transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationPatch {
    /// The monitor stopped scheduling the account.
    Disabled { at: DateTime<Utc>, reason: String },
    /// The monitor resumed scheduling an account it had disabled.
    Recovered { at: DateTime<Utc>, reason: String },
}

impl AnnotationPatch {
    /// Render as a repository `extra` merge. `null` values clear the key.
    pub fn to_extra_updates(&self) -> Map<String, Value> {
        let mut updates = Map::new();
        match self {
            Self::Disabled { at, reason } => {
                updates.insert(AUTO_DISABLED_KEY.to_string(), Value::Bool(true));
                updates.insert(DISABLED_AT_KEY.to_string(), Value::String(format_timestamp(at)));
                updates.insert(DISABLED_REASON_KEY.to_string(), Value::String(reason.clone()));
                // Stale recovery info from a previous cycle would be misleading.
                updates.insert(RECOVERED_AT_KEY.to_string(), Value::Null);
                updates.insert(RECOVERED_REASON_KEY.to_string(), Value::Null);
            },
            Self::Recovered { at, reason } => {
                updates.insert(AUTO_DISABLED_KEY.to_string(), Value::Bool(false));
                updates.insert(RECOVERED_AT_KEY.to_string(), Value::String(format_timestamp(at)));
                updates.insert(RECOVERED_REASON_KEY.to_string(), Value::String(reason.clone()));
            },
        }
        updates
    }
}

/// Merge `updates` into `extra` with repository semantics: `null` removes the key,
/// everything else overwrites.
pub fn merge_extra(extra: &mut Map<String, Value>, updates: &Map<String, Value>) {
    for (key, value) in updates {
        if value.is_null() {
            extra.remove(key);
        } else {
            extra.insert(key.clone(), value.clone());
        }
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
