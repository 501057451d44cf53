//! Account connectivity probes.

use async_trait::async_trait;
use gatepool_types::models::{Account, AppConfig, UrlAllowlistConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::upstream::claude::{
    build_api_key_request, consume_test_stream, test_payload, DEFAULT_API_BASE_URL,
    DEFAULT_MONITOR_MODEL,
};
use crate::upstream::url_validator::validate_upstream_base_url;
use crate::upstream::{HttpUpstream, UpstreamRequest, UpstreamTarget};
use crate::utils::text::truncate_chars;

/// Non-200 bodies are read up to this many bytes.
const ERROR_BODY_LIMIT: usize = 2048;
/// Upper bound for any probe diagnostic.
pub const MAX_PROBE_MESSAGE_CHARS: usize = 2048;
/// Smallest legal output cap: enough to prove auth and model routing.
const PROBE_MAX_TOKENS: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub account_id: i64,
    pub success: bool,
    /// Empty on success.
    pub message: String,
    pub latency: Duration,
}

impl ProbeResult {
    pub fn success(account_id: i64, latency: Duration) -> Self {
        Self { account_id, success: true, message: String::new(), latency }
    }

    /// Failure with a trimmed, length-bounded, never-empty message.
    pub fn failure(account_id: i64, message: impl AsRef<str>, latency: Duration) -> Self {
        let trimmed = message.as_ref().trim();
        let message = if trimmed.is_empty() {
            "Unknown error".to_string()
        } else {
            truncate_chars(trimmed, MAX_PROBE_MESSAGE_CHARS)
        };
        Self { account_id, success: false, message, latency }
    }
}

/// One lightweight, deadline-bound health check per account.
#[async_trait]
pub trait AccountProber: Send + Sync {
    async fn probe(&self, account: &Account) -> ProbeResult;
}

/// Probes Anthropic API-key accounts with a one-token streaming request.
pub struct AnthropicApiKeyProber {
    upstream: Arc<dyn HttpUpstream>,
    request_timeout: Duration,
    model_override: Option<String>,
    tls_fingerprint: bool,
    url_policy: UrlAllowlistConfig,
}

impl AnthropicApiKeyProber {
    pub fn new(upstream: Arc<dyn HttpUpstream>, config: &AppConfig) -> Self {
        let monitor = &config.gateway.account_monitor;
        Self {
            upstream,
            request_timeout: monitor.effective_request_timeout(),
            model_override: monitor.effective_model_id().map(str::to_string),
            tls_fingerprint: config.gateway.tls_fingerprint_enabled,
            url_policy: config.security.url_allowlist.clone(),
        }
    }

    /// Model used for `account`: override or default, then the account's mapping.
    pub fn model_for(&self, account: &Account) -> String {
        let model = self.model_override.as_deref().unwrap_or(DEFAULT_MONITOR_MODEL);
        account.mapped_model(model)
    }

    fn build(&self, account: &Account) -> Result<(UpstreamRequest, UpstreamTarget), String> {
        let api_key = account.credential("api_key").ok_or("No API key available")?;

        let base_url = account.base_url().unwrap_or(DEFAULT_API_BASE_URL);
        let base_url = validate_upstream_base_url(base_url, &self.url_policy)
            .map_err(|e| format!("Invalid base URL: {}", e))?;

        let payload = test_payload(&self.model_for(account), PROBE_MAX_TOKENS);
        let request = build_api_key_request(&base_url, api_key, &payload);
        let target = UpstreamTarget {
            account_id: account.id,
            account_concurrency: account.concurrency,
            proxy_url: account.proxy_url.clone(),
            enable_tls_fingerprint: self.tls_fingerprint,
        };
        Ok((request, target))
    }

    async fn execute(
        &self,
        request: UpstreamRequest,
        target: &UpstreamTarget,
    ) -> Result<(), String> {
        let response = self
            .upstream
            .send(request, target, self.request_timeout)
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if response.status != 200 {
            let status = response.status;
            let body = response.read_limited(ERROR_BODY_LIMIT).await.unwrap_or_default();
            let text = String::from_utf8_lossy(&body);
            let text = text.trim();
            let text = if text.is_empty() { "(empty response)" } else { text };
            return Err(format!("API returned {}: {}", status, text));
        }

        consume_test_stream(response.body).await
    }
}

#[async_trait]
impl AccountProber for AnthropicApiKeyProber {
    async fn probe(&self, account: &Account) -> ProbeResult {
        let started = Instant::now();

        let (request, target) = match self.build(account) {
            Ok(parts) => parts,
            Err(message) => return ProbeResult::failure(account.id, message, started.elapsed()),
        };

        let outcome =
            tokio::time::timeout(self.request_timeout, self.execute(request, &target)).await;
        let latency = started.elapsed();
        match outcome {
            Ok(Ok(())) => ProbeResult::success(account.id, latency),
            Ok(Err(message)) => ProbeResult::failure(account.id, message, latency),
            Err(_) => ProbeResult::failure(
                account.id,
                format!("Request timed out after {:?}", self.request_timeout),
                latency,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::test_support::{anthropic_account, StubUpstream};

    fn prober(
        upstream: Arc<StubUpstream>,
        mutate: impl FnOnce(&mut AppConfig),
    ) -> AnthropicApiKeyProber {
        let mut config = AppConfig::default();
        config.security.url_allowlist.allow_insecure_http = true;
        mutate(&mut config);
        AnthropicApiKeyProber::new(upstream, &config)
    }

    #[tokio::test]
    async fn test_passes_tls_fingerprint_toggle() {
        let upstream = StubUpstream::sse("data: {\"type\":\"message_stop\"}\n\n");
        let prober = prober(upstream.clone(), |c| c.gateway.tls_fingerprint_enabled = true);

        let result = prober.probe(&anthropic_account(1)).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(upstream.calls(), 1);

        let (request, target) = upstream.last_call().unwrap();
        assert!(target.enable_tls_fingerprint);
        assert!(request.header("user-agent").unwrap().starts_with("claude-cli/"));
        assert_eq!(request.header("x-api-key"), Some("sk-test-1"));
    }

    #[tokio::test]
    async fn test_fingerprint_off_by_default() {
        let upstream = StubUpstream::sse("data: {\"type\":\"message_stop\"}\n\n");
        let prober = prober(upstream.clone(), |_| {});
        assert!(prober.probe(&anthropic_account(1)).await.success);
        let (_, target) = upstream.last_call().unwrap();
        assert!(!target.enable_tls_fingerprint);
        assert_eq!(target.account_id, 1);
    }

    #[tokio::test]
    async fn test_payload_uses_mapped_model_and_one_token() {
        let upstream = StubUpstream::sse("data: [DONE]\n");
        let prober = prober(upstream.clone(), |c| {
            c.gateway.account_monitor.model_id = "claude-probe".to_string();
        });
        let mut account = anthropic_account(3);
        account.credentials.insert(
            "model_mapping".to_string(),
            serde_json::json!({"claude-probe": "claude-probe-mapped"}),
        );

        assert!(prober.probe(&account).await.success);
        let (request, _) = upstream.last_call().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["model"], "claude-probe-mapped");
        assert_eq!(body["max_tokens"], 1);
        assert_eq!(body["stream"], true);
    }

    #[tokio::test]
    async fn test_missing_api_key_skips_upstream() {
        let upstream = StubUpstream::sse("");
        let prober = prober(upstream.clone(), |_| {});
        let mut account = anthropic_account(2);
        account.credentials.remove("api_key");

        let result = prober.probe(&account).await;
        assert!(!result.success);
        assert_eq!(result.message, "No API key available");
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_base_url() {
        let upstream = StubUpstream::sse("");
        let prober = prober(upstream.clone(), |c| {
            c.security.url_allowlist.enabled = true;
            c.security.url_allowlist.upstream_hosts = vec!["api.anthropic.com".to_string()];
        });
        let mut account = anthropic_account(2);
        account
            .credentials
            .insert("base_url".to_string(), serde_json::json!("https://evil.example.com"));

        let result = prober.probe(&account).await;
        assert!(result.message.starts_with("Invalid base URL: "), "{}", result.message);
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_200_reports_status_and_body() {
        let upstream = StubUpstream::status(401, "  {\"error\":\"invalid x-api-key\"}  ");
        let result = prober(upstream, |_| {}).probe(&anthropic_account(1)).await;
        assert!(!result.success);
        assert_eq!(result.message, "API returned 401: {\"error\":\"invalid x-api-key\"}");

        let upstream = StubUpstream::status(503, "   ");
        let result = prober(upstream, |_| {}).probe(&anthropic_account(1)).await;
        assert_eq!(result.message, "API returned 503: (empty response)");
    }

    #[tokio::test]
    async fn test_transport_error_and_timeout() {
        let upstream = StubUpstream::failing("connection refused");
        let result = prober(upstream, |_| {}).probe(&anthropic_account(1)).await;
        assert_eq!(result.message, "Request failed: connection refused");

        let upstream = StubUpstream::hanging();
        let prober = prober(upstream, |c| c.gateway.account_monitor.request_timeout_seconds = 1);
        let result = prober.probe(&anthropic_account(1)).await;
        assert!(!result.success);
        assert_eq!(result.message, "Request timed out after 1s");
    }

    #[test]
    fn test_failure_message_bounded_and_non_empty() {
        let result = ProbeResult::failure(1, "   ", Duration::ZERO);
        assert_eq!(result.message, "Unknown error");

        let long = "x".repeat(MAX_PROBE_MESSAGE_CHARS + 50);
        let result = ProbeResult::failure(1, &long, Duration::ZERO);
        assert_eq!(result.message.chars().count(), MAX_PROBE_MESSAGE_CHARS + 1);
    }
}
