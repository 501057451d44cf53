//! Per-account hysteresis counters.
//!
//! Counters are process-local and owned by the control loop. They decide when a
//! run of same-outcome probes is long enough to flip an account's schedulable
//! flag; the actual writes happen in the loop, which calls
//! [`HealthStateMachine::commit`] only once the flag write succeeded.

use chrono::{DateTime, Utc};
use gatepool_types::models::{Account, AnnotationPatch};
use std::collections::{HashMap, HashSet};

use super::probe::ProbeResult;
use crate::utils::text::truncate_chars;

/// Longest reason persisted in annotations and alerts.
pub const MAX_REASON_CHARS: usize = 1500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorState {
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_error: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// A threshold crossing that should change the account's schedulable flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Disable { threshold: u32, reason: String },
    Recover { threshold: u32, reason: String },
}

impl Transition {
    /// Schedulable value to write.
    pub const fn schedulable(&self) -> bool {
        matches!(self, Self::Recover { .. })
    }

    pub const fn threshold(&self) -> u32 {
        match self {
            Self::Disable { threshold, .. } | Self::Recover { threshold, .. } => *threshold,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Disable { reason, .. } | Self::Recover { reason, .. } => reason,
        }
    }

    pub fn to_patch(&self, at: DateTime<Utc>) -> AnnotationPatch {
        let reason = self.reason().to_string();
        match self {
            Self::Disable { .. } => AnnotationPatch::Disabled { at, reason },
            Self::Recover { .. } => AnnotationPatch::Recovered { at, reason },
        }
    }
}

#[derive(Debug)]
pub struct HealthStateMachine {
    failure_threshold: u32,
    success_threshold: u32,
    states: HashMap<i64, MonitorState>,
}

impl HealthStateMachine {
    /// Thresholds below 1 are treated as 1.
    pub fn new(failure_threshold: u32, success_threshold: u32) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            states: HashMap::new(),
        }
    }

    /// Record one probe outcome and report whether a transition is due.
    ///
    /// `account` is the snapshot the probe ran against; its `schedulable` flag
    /// and auto-disabled marker guard the transition. Ids `<= 0` are ignored.
    pub fn observe(
        &mut self,
        account: &Account,
        result: &ProbeResult,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        if result.account_id <= 0 {
            return None;
        }
        let state = self.states.entry(result.account_id).or_default();
        state.last_checked_at = Some(now);

        if result.success {
            state.consecutive_successes = state.consecutive_successes.saturating_add(1);
            state.consecutive_failures = 0;
            state.last_error = None;

            if state.consecutive_successes < self.success_threshold {
                return None;
            }
            // Only undo what the monitor itself did.
            if account.schedulable || !account.monitor_annotations().auto_disabled {
                return None;
            }
            return Some(Transition::Recover {
                threshold: self.success_threshold,
                reason: format!("consecutive_successes={}", self.success_threshold),
            });
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.consecutive_successes = 0;
        let message = result.message.trim();
        state.last_error = (!message.is_empty()).then(|| message.to_string());

        if state.consecutive_failures < self.failure_threshold || !account.schedulable {
            return None;
        }
        let reason = match state.last_error.as_deref() {
            Some(error) => truncate_chars(error, MAX_REASON_CHARS),
            None => format!("consecutive_failures={}", self.failure_threshold),
        };
        Some(Transition::Disable { threshold: self.failure_threshold, reason })
    }

    /// Reset the counter that produced `transition` after the flag was written.
    pub fn commit(&mut self, account_id: i64, transition: &Transition) {
        if let Some(state) = self.states.get_mut(&account_id) {
            match transition {
                Transition::Disable { .. } => state.consecutive_failures = 0,
                Transition::Recover { .. } => state.consecutive_successes = 0,
            }
        }
    }

    pub fn reset(&mut self) {
        self.states.clear();
    }

    /// Drop state for accounts that are no longer monitored.
    pub fn retain(&mut self, monitored: &HashSet<i64>) {
        self.states.retain(|id, _| monitored.contains(id));
    }

    pub fn get(&self, account_id: i64) -> Option<&MonitorState> {
        self.states.get(&account_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
