//! Upstream URL policy.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, Validate)]
pub struct SecurityConfig {
    #[serde(default)]
    #[validate(nested)]
    pub url_allowlist: UrlAllowlistConfig,
}

/// Restricts which custom base URLs accounts may point at.
///
/// With the allowlist disabled only the scheme is checked. With it enabled the
/// URL must be `https`, the host must appear in `upstream_hosts`, and private
/// or loopback hosts are refused unless `allow_private_hosts` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, Validate)]
pub struct UrlAllowlistConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Accept plain `http` while the allowlist is disabled
    #[serde(default)]
    pub allow_insecure_http: bool,
    /// Permitted upstream hosts; `*.example.com` matches subdomains
    #[serde(default)]
    pub upstream_hosts: Vec<String>,
    #[serde(default)]
    pub allow_private_hosts: bool,
}
