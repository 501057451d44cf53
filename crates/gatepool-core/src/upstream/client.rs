//! `reqwest`-backed upstream transport with per-proxy client reuse.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use super::claude::CLI_USER_AGENT;
use super::{HttpUpstream, UpstreamError, UpstreamRequest, UpstreamResponse, UpstreamTarget};

/// Cache key: proxy URL (empty for direct) plus client profile.
type ClientKey = (String, bool);

/// Caches one `reqwest::Client` per (proxy, profile) for connection reuse.
///
/// The fingerprint profile speaks HTTP/1.1 only with a CLI user agent, the
/// shape of traffic produced by the official Claude CLI.
#[derive(Default)]
pub struct ReqwestUpstream {
    clients: RwLock<HashMap<ClientKey, Client>>,
}

impl ReqwestUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client_for(&self, target: &UpstreamTarget) -> Result<Client, UpstreamError> {
        let proxy_url = target.proxy_url.as_deref().map(str::trim).unwrap_or_default();
        let key: ClientKey = (proxy_url.to_string(), target.enable_tls_fingerprint);

        // Fast path: check read lock
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&key) {
                return Ok(client.clone());
            }
        }

        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_client(proxy_url, target.enable_tls_fingerprint)?;
        tracing::debug!(
            proxy = !proxy_url.is_empty(),
            tls_fingerprint = target.enable_tls_fingerprint,
            "Created upstream client"
        );
        clients.insert(key, client.clone());
        Ok(client)
    }
}

fn build_client(proxy_url: &str, fingerprint: bool) -> Result<Client, UpstreamError> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(20))
        .pool_max_idle_per_host(8)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .use_rustls_tls();

    if fingerprint {
        builder = builder.http1_only().user_agent(CLI_USER_AGENT);
    }

    if !proxy_url.is_empty() {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| UpstreamError::InvalidProxy(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(|e| UpstreamError::ClientBuild(e.to_string()))
}

#[async_trait]
impl HttpUpstream for ReqwestUpstream {
    async fn send(
        &self,
        request: UpstreamRequest,
        target: &UpstreamTarget,
        timeout: Duration,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let client = self.client_for(target).await?;

        let mut builder = client.post(&request.url).timeout(timeout).body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| UpstreamError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| UpstreamError::Body(e.to_string())))
            .boxed();

        Ok(UpstreamResponse::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_cached_per_profile() {
        let upstream = ReqwestUpstream::new();
        let direct = UpstreamTarget::default();
        let fingerprinted = UpstreamTarget { enable_tls_fingerprint: true, ..Default::default() };

        upstream.client_for(&direct).await.unwrap();
        upstream.client_for(&direct).await.unwrap();
        upstream.client_for(&fingerprinted).await.unwrap();

        assert_eq!(upstream.clients.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_proxy_rejected() {
        let upstream = ReqwestUpstream::new();
        let target =
            UpstreamTarget { proxy_url: Some("not a proxy".to_string()), ..Default::default() };
        let err = upstream.client_for(&target).await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidProxy(_)));
    }
}
