//! Upstream HTTP transport.
//!
//! Probes build an [`UpstreamRequest`] and hand it to an [`HttpUpstream`]
//! together with the account's routing context ([`UpstreamTarget`]). The
//! response body is exposed as a byte stream so SSE can be consumed
//! incrementally and abandoned early.

pub mod claude;
pub mod client;
pub mod url_validator;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;

pub use client::ReqwestUpstream;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid proxy url: {0}")]
    InvalidProxy(String),
    #[error("failed to build http client: {0}")]
    ClientBuild(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Request(String),
    #[error("{0}")]
    Body(String),
}

/// Streaming response body.
pub type BodyStream = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// A single POST to an upstream API.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl UpstreamRequest {
    pub fn new(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self { url: url.into(), headers: Vec::new(), body: body.into() }
    }

    /// Set a header, replacing any previous value (case-insensitive).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.headers.push((name.to_ascii_lowercase(), value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Routing context for one upstream call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub account_id: i64,
    pub account_concurrency: u32,
    pub proxy_url: Option<String>,
    /// Use the fingerprinted client profile
    pub enable_tls_fingerprint: bool,
}

pub struct UpstreamResponse {
    pub status: u16,
    pub body: BodyStream,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: BodyStream) -> Self {
        Self { status, body }
    }

    /// Response with a fully buffered body.
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self { status, body: stream::once(async move { Ok(body) }).boxed() }
    }

    /// Read at most `limit` bytes of the body and drop the rest.
    pub async fn read_limited(mut self, limit: usize) -> Result<Vec<u8>, UpstreamError> {
        let mut buf = Vec::with_capacity(limit.min(8 * 1024));
        while buf.len() < limit {
            match self.body.next().await {
                Some(chunk) => buf.extend_from_slice(&chunk?),
                None => break,
            }
        }
        buf.truncate(limit);
        Ok(buf)
    }
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse").field("status", &self.status).finish_non_exhaustive()
    }
}

/// Outbound HTTP seam used by probes.
#[async_trait]
pub trait HttpUpstream: Send + Sync {
    /// Send `request`. The caller bounds the whole exchange with its own deadline;
    /// `timeout` is a hint for per-connection limits.
    async fn send(
        &self,
        request: UpstreamRequest,
        target: &UpstreamTarget,
        timeout: Duration,
    ) -> Result<UpstreamResponse, UpstreamError>;
}
