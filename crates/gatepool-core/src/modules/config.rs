//! Configuration loading: JSON file, then environment overrides.

use gatepool_types::models::{AppConfig, RunMode};
use gatepool_types::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

const CONFIG_DIR: &str = ".gatepool";
const CONFIG_FILE: &str = "config.json";
const MONITOR_ENV_PREFIX: &str = "GATEWAY_ACCOUNT_MONITOR_";
const LEGACY_MONITOR_ENV_PREFIX: &str = "GATEWAY_SCHEDULING_ANTHROPIC_APIKEY_MONITOR_";

/// `~/.gatepool/config.json`, when a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Read the config file.
///
/// An explicit `path` must exist. Without one, a missing default file yields
/// the built-in defaults.
pub fn load_config_file(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let (config_path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return Ok(AppConfig::default()),
        },
    };

    if !config_path.exists() {
        if required {
            return Err(ConfigError::NotFound { path: config_path.display().to_string() });
        }
        tracing::debug!(path = %config_path.display(), "No config file, using defaults");
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::from_io_error(&e))?;
    serde_json::from_str(&content).map_err(|e| ConfigError::from_json_error(&e))
}

/// Load the effective configuration: file, process environment, normalization, validation.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = load_config_file(path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    finalize(&mut config)?;
    Ok(config)
}

/// Normalize ID lists and run field validation.
pub fn finalize(config: &mut AppConfig) -> Result<(), ConfigError> {
    config.gateway.account_monitor.normalize();
    config.validate().map_err(|errors| {
        let field = errors
            .errors()
            .keys()
            .next()
            .map_or_else(|| "config".to_string(), |key| key.to_string());
        ConfigError::ValidationError { field, message: errors.to_string() }
    })
}

/// Apply environment overrides on top of file values.
///
/// `lookup` returns the raw value of a variable; blank values are ignored.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(v) = get("GATEPOOL_RUN_MODE") {
        config.run_mode = RunMode::from_string(&v);
    }
    if let Some(v) = get("GATEPOOL_DATABASE_URL") {
        config.database_url = Some(v);
    }
    if let Some(v) = get("GATEWAY_TLS_FINGERPRINT_ENABLED") {
        config.gateway.tls_fingerprint_enabled = parse_bool("GATEWAY_TLS_FINGERPRINT_ENABLED", &v)?;
    }

    // Current name first, then the older scheduling-scoped name.
    let monitor_var = |suffix: &str, legacy_suffix: &str| -> Option<(String, String)> {
        let name = format!("{}{}", MONITOR_ENV_PREFIX, suffix);
        if let Some(v) = get(&name) {
            return Some((name, v));
        }
        let legacy = format!("{}{}", LEGACY_MONITOR_ENV_PREFIX, legacy_suffix);
        get(&legacy).map(|v| (legacy, v))
    };

    let monitor = &mut config.gateway.account_monitor;
    if let Some((var, v)) = monitor_var("ENABLED", "ENABLED") {
        monitor.enabled = parse_bool(&var, &v)?;
    }
    if let Some((var, v)) = monitor_var("INTERVAL_SECONDS", "INTERVAL") {
        monitor.interval_seconds = parse_seconds(&var, &v)?;
    }
    if let Some((var, v)) = monitor_var("FAILURE_THRESHOLD", "FAILURE_THRESHOLD") {
        monitor.failure_threshold = parse_num(&var, &v)?;
    }
    if let Some((var, v)) = monitor_var("SUCCESS_THRESHOLD", "SUCCESS_THRESHOLD") {
        monitor.success_threshold = parse_num(&var, &v)?;
    }
    if let Some((var, v)) = monitor_var("REQUEST_TIMEOUT_SECONDS", "REQUEST_TIMEOUT") {
        monitor.request_timeout_seconds = parse_seconds(&var, &v)?;
    }
    if let Some((var, v)) = monitor_var("MAX_CONCURRENCY", "MAX_CONCURRENCY") {
        monitor.max_concurrency = parse_num(&var, &v)?;
    }
    if let Some((_, v)) = monitor_var("MODEL_ID", "MODEL_ID") {
        monitor.model_id = v;
    }
    if let Some((var, v)) = monitor_var("INCLUDE_ACCOUNT_IDS", "INCLUDE_ACCOUNT_IDS") {
        monitor.include_account_ids =
            parse_id_list(&v).map_err(|e| ConfigError::invalid_env(&var, e))?;
    }
    if let Some((var, v)) = monitor_var("EXCLUDE_ACCOUNT_IDS", "EXCLUDE_ACCOUNT_IDS") {
        monitor.exclude_account_ids =
            parse_id_list(&v).map_err(|e| ConfigError::invalid_env(&var, e))?;
    }

    let dingtalk = &mut config.dingtalk;
    if let Some(v) = get("DINGTALK_ENABLED") {
        dingtalk.enabled = parse_bool("DINGTALK_ENABLED", &v)?;
    }
    if let Some(v) = get("DINGTALK_ENV") {
        dingtalk.env = v;
    }
    if let Some(v) = get("DINGTALK_WEBHOOK_URL") {
        dingtalk.webhook_url = Some(v);
    }
    if let Some(v) = get("DINGTALK_SECRET") {
        dingtalk.secret = v;
    }
    if let Some(v) = get("DINGTALK_AT_MOBILES") {
        dingtalk.at_mobiles = split_csv(&v);
    }
    if let Some(v) = get("DINGTALK_AT_ALL") {
        dingtalk.at_all = parse_bool("DINGTALK_AT_ALL", &v)?;
    }

    Ok(())
}

/// Parse an account ID list: a JSON array of numbers or numeric strings, or CSV.
pub fn parse_id_list(raw: &str) -> Result<Vec<i64>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    if raw.starts_with('[') {
        let values: Vec<serde_json::Value> =
            serde_json::from_str(raw).map_err(|e| format!("invalid JSON array: {}", e))?;
        return values
            .iter()
            .map(|value| match value {
                serde_json::Value::Number(n) => {
                    n.as_i64().ok_or_else(|| format!("not an integer: {}", n))
                },
                serde_json::Value::String(s) => parse_id(s),
                other => Err(format!("unsupported value: {}", other)),
            })
            .collect();
    }

    raw.split(',').map(str::trim).filter(|part| !part.is_empty()).map(parse_id).collect()
}

fn parse_id(s: &str) -> Result<i64, String> {
    s.trim().parse::<i64>().map_err(|_| format!("not an integer: '{}'", s.trim()))
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_env(var, format!("expected a boolean, got '{}'", raw))),
    }
}

fn parse_num<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>()
        .map_err(|_| ConfigError::invalid_env(var, format!("expected a number, got '{}'", raw)))
}

/// Whole seconds: a bare integer, or one with an `s`, `m` or `h` unit (`10s`, `2m`).
fn parse_seconds(var: &str, raw: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::invalid_env(var, format!("expected seconds, got '{}'", raw));
    let (digits, scale) = match raw.char_indices().last() {
        Some((i, 's')) => (&raw[..i], 1),
        Some((i, 'm')) => (&raw[..i], 60),
        Some((i, 'h')) => (&raw[..i], 3600),
        _ => (raw, 1),
    };
    let value = digits.trim().parse::<u64>().map_err(|_| invalid())?;
    value.checked_mul(scale).ok_or_else(invalid)
}
