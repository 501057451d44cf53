//! Chat-ops alert configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// DingTalk-compatible robot webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, Validate)]
pub struct DingtalkConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Environment tag shown in alert titles (e.g. `prod`)
    #[serde(default)]
    pub env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub webhook_url: Option<String>,
    /// Signing secret; empty disables URL signing
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub at_mobiles: Vec<String>,
    #[serde(default)]
    pub at_all: bool,
}

impl DingtalkConfig {
    /// Enabled and has somewhere to send.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.webhook_url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }
}
