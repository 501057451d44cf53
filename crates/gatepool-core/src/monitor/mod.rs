//! Account health monitor.
//!
//! A leader-elected control loop that probes Anthropic API-key accounts on a
//! fixed interval and flips their `schedulable` flag after a run of
//! consecutive failures or successes.
//!
//! ```text
//! tick ─► lock::LeaderLock::acquire_or_refresh
//!      ─► scheduler::select_targets
//!      ─► scheduler::ProbeScheduler::run   (bounded fan-out, joined)
//!      ─► state::HealthStateMachine::observe
//!      ─► repository writes + alert::AlertNotifier
//! ```

pub mod lock;
pub mod probe;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use probe::{AccountProber, AnthropicApiKeyProber, ProbeResult};
pub use service::{AccountHealthMonitor, MonitorSnapshot};
pub use shutdown::Shutdown;
