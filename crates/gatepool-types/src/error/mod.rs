//! Typed error definitions shared across the gatepool crates.

mod config;

pub use config::ConfigError;
