//! # Gatepool Types
//!
//! Core types, models, and error definitions shared by the gatepool crates.
//!
//! - **`error`** - Typed errors for configuration loading and validation
//! - **`models`** - Domain models (Account, monitor annotations, configuration)
//!
//! ## Architecture Role
//!
//! ```text
//!                gatepool-types (this crate)
//!                        │
//!                        ▼
//!                  gatepool-core
//!                        │
//!                        ▼
//!                 gatepool-server
//! ```

pub mod error;
pub mod models;

pub use error::ConfigError;

pub use models::{
    Account, AccountMonitorConfig, AccountStatus, AccountType, AnnotationPatch, AppConfig,
    DingtalkConfig, GatewayConfig, MonitorAnnotations, Platform, RunMode, SecurityConfig,
    UrlAllowlistConfig,
};
