//! Validation of account-supplied upstream base URLs.

use gatepool_types::models::UrlAllowlistConfig;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Validate a base URL against the configured policy and return it normalized
/// (no trailing slash).
pub fn validate_upstream_base_url(
    raw: &str,
    policy: &UrlAllowlistConfig,
) -> Result<String, String> {
    if !policy.enabled {
        return validate_url_format(raw, policy.allow_insecure_http);
    }
    validate_https_url(raw, &policy.upstream_hosts, policy.allow_private_hosts)
}

/// Well-formed http(s) URL with a host. Plain `http` only when allowed.
pub fn validate_url_format(raw: &str, allow_insecure_http: bool) -> Result<String, String> {
    let url = parse(raw)?;
    match url.scheme() {
        "https" => {},
        "http" if allow_insecure_http => {},
        "http" => return Err("insecure http is not allowed".to_string()),
        other => return Err(format!("unsupported scheme '{}'", other)),
    }
    Ok(normalize(&url))
}

/// `https` URL whose host is allowlisted and, unless permitted, not private.
pub fn validate_https_url(
    raw: &str,
    allowed_hosts: &[String],
    allow_private: bool,
) -> Result<String, String> {
    let url = parse(raw)?;
    if url.scheme() != "https" {
        return Err(format!("scheme must be https, got '{}'", url.scheme()));
    }

    let host = url.host().ok_or_else(|| "missing host".to_string())?;
    let host_str = host_name(&host);

    if !allowed_hosts.iter().any(|pattern| host_matches(pattern, &host_str)) {
        return Err(format!("host '{}' is not in the upstream allowlist", host_str));
    }
    if !allow_private && is_private_host(&host) {
        return Err(format!("host '{}' resolves to a private address", host_str));
    }
    Ok(normalize(&url))
}

fn parse(raw: &str) -> Result<Url, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty url".to_string());
    }
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !url.host_str().is_some_and(|host| !host.is_empty()) {
        return Err("missing host".to_string());
    }
    Ok(url)
}

fn normalize(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

fn host_name(host: &Host<&str>) -> String {
    match host {
        Host::Domain(domain) => domain.to_ascii_lowercase(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    }
}

/// Exact match, or `*.example.com` for any subdomain of `example.com`.
fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    if pattern.is_empty() {
        return false;
    }
    match pattern.strip_prefix("*.") {
        Some(suffix) => host.len() > suffix.len() && host.ends_with(&format!(".{}", suffix)),
        None => host == pattern,
    }
}

fn is_private_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        },
        Host::Ipv4(ip) => is_private_v4(*ip),
        Host::Ipv6(ip) => is_private_v6(*ip),
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64)
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
}

/// Whether an IP literal would be refused as private.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}
