//! Gateway configuration models.

mod alert;
mod app;
mod monitor;
mod security;

pub use alert::DingtalkConfig;
pub use app::{AppConfig, GatewayConfig, RunMode};
pub use monitor::AccountMonitorConfig;
pub use security::{SecurityConfig, UrlAllowlistConfig};
