//! # Gatepool Core
//!
//! Background health management for the gateway's upstream account pool.
//!
//! ```text
//! gatepool-core/src/
//! ├── modules/   # account repository (trait + PostgreSQL), config loading
//! ├── upstream/  # HTTP transport seam, Claude request shape, base-URL policy
//! ├── monitor/   # leader lock, probes, hysteresis state machine, control loop
//! ├── alert/     # webhook sink, transition alerts, account error alerts
//! └── utils/     # text helpers shared by alerts and probes
//! ```
//!
//! The monitor is the only writer of an account's `schedulable` flag from this
//! crate; every write goes through [`modules::repository::AccountRepository`].

#![allow(
    clippy::significant_drop_tightening,
    reason = "Mutex guards in async code require careful lifetime management"
)]
#![allow(
    clippy::redundant_else,
    reason = "Explicit else blocks improve readability in complex control flow"
)]
#![allow(clippy::map_err_ignore, reason = "Error context is provided in the replacement message")]
#![allow(clippy::needless_continue, reason = "Explicit continue improves loop readability")]
// Test-only lints: allow panic!, println!, etc. in test code
#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::print_stdout,
        clippy::needless_collect,
        clippy::assertions_on_result_states
    )
)]

pub mod alert;
pub mod error;
pub mod modules;
pub mod monitor;
pub mod upstream;
pub mod utils;

// Re-export commonly used types
pub use error::{AppError, AppResult};
pub use gatepool_types::models::{Account, AppConfig};
pub use monitor::{AccountHealthMonitor, MonitorSnapshot};
