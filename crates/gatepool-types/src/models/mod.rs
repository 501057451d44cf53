//! Core domain models for the gatepool gateway.

mod account;
pub mod annotations;
mod config;

pub use account::{Account, AccountStatus, AccountType, Platform};
pub use annotations::{merge_extra, AnnotationPatch, MonitorAnnotations};
pub use config::{
    AccountMonitorConfig, AppConfig, DingtalkConfig, GatewayConfig, RunMode, SecurityConfig,
    UrlAllowlistConfig,
};
