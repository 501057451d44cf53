//! Account model and related types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::MonitorAnnotations;

/// Upstream provider an account belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Antigravity,
}

impl Platform {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Antigravity => "antigravity",
        }
    }

    /// Parse from the stored string form.
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim() {
            "anthropic" => Some(Self::Anthropic),
            "openai" => Some(Self::OpenAi),
            "gemini" => Some(Self::Gemini),
            "antigravity" => Some(Self::Antigravity),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of credential an account carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccountType {
    #[serde(rename = "oauth")]
    OAuth,
    #[serde(rename = "setup-token")]
    SetupToken,
    #[serde(rename = "apikey")]
    ApiKey,
}

impl AccountType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OAuth => "oauth",
            Self::SetupToken => "setup-token",
            Self::ApiKey => "apikey",
        }
    }

    /// Parse from the stored string form.
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim() {
            "oauth" => Some(Self::OAuth),
            "setup-token" => Some(Self::SetupToken),
            "apikey" => Some(Self::ApiKey),
            _ => None,
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrative status of an account.
///
/// Independent from `Account::schedulable`: an `Active` account may still be
/// excluded from routing when it is not schedulable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    Disabled,
    Error,
}

impl AccountStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
            Self::Error => "error",
        }
    }

    /// Parse from the stored string form. Unknown values map to `Disabled`.
    pub fn from_string(s: &str) -> Self {
        match s.trim() {
            "active" => Self::Active,
            "error" => Self::Error,
            _ => Self::Disabled,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream account record as stored by the account repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    /// Unique identifier (positive)
    pub id: i64,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Upstream provider
    pub platform: Platform,
    /// Credential kind
    #[serde(rename = "type")]
    pub account_type: AccountType,
    /// Administrative status
    #[serde(default)]
    pub status: AccountStatus,
    /// Whether the router may send live traffic to this account
    #[serde(default)]
    pub schedulable: bool,
    /// Maximum concurrent upstream requests for this account
    #[serde(default)]
    pub concurrency: u32,
    /// Provider credentials (`api_key`, `base_url`, `model_mapping`, ...)
    #[serde(default)]
    pub credentials: Map<String, Value>,
    /// Open metadata bag; monitor audit fields live here
    #[serde(default)]
    pub extra: Map<String, Value>,
    /// Outbound proxy for this account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Last error recorded by other subsystems
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Account {
    /// Create a schedulable, active account with empty credentials.
    pub fn new(
        id: i64,
        name: impl Into<String>,
        platform: Platform,
        account_type: AccountType,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            platform,
            account_type,
            status: AccountStatus::Active,
            schedulable: true,
            concurrency: 1,
            credentials: Map::new(),
            extra: Map::new(),
            proxy_url: None,
            error_message: None,
        }
    }

    /// String credential by key, trimmed. Empty values are treated as absent.
    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Custom upstream base URL, if configured.
    pub fn base_url(&self) -> Option<&str> {
        self.credential("base_url")
    }

    /// Apply the account-level `model_mapping` credential to a model ID.
    ///
    /// Returns the input unchanged when there is no mapping for it.
    pub fn mapped_model(&self, model: &str) -> String {
        self.credentials
            .get("model_mapping")
            .and_then(Value::as_object)
            .and_then(|mapping| mapping.get(model))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|mapped| !mapped.is_empty())
            .unwrap_or(model)
            .to_string()
    }

    /// Name for alerts and logs.
    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() {
            "(unnamed)"
        } else {
            name
        }
    }

    /// Typed view over the monitor audit fields in `extra`.
    pub fn monitor_annotations(&self) -> MonitorAnnotations {
        MonitorAnnotations::from_extra(&self.extra)
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}
