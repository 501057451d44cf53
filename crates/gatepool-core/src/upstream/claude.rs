//! Anthropic Messages API request shape and test-stream parsing.

use bytes::BytesMut;
use futures::StreamExt;
use serde_json::{json, Value};

use super::{BodyStream, UpstreamRequest};

pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";
pub const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_BETA_HEADER: &str =
    "claude-code-20250219,interleaved-thinking-2025-05-14,fine-grained-tool-streaming-2025-05-14";
/// Cheapest model that exercises auth and model routing.
pub const DEFAULT_MONITOR_MODEL: &str = "claude-haiku-4-5-20251001";
pub const CLI_USER_AGENT: &str = "claude-cli/2.0.14 (external, cli)";

/// Headers the Claude CLI sends on every request.
const CLI_HEADERS: &[(&str, &str)] = &[
    ("user-agent", CLI_USER_AGENT),
    ("x-app", "cli"),
    ("anthropic-dangerous-direct-browser-access", "true"),
    ("x-stainless-lang", "js"),
    ("x-stainless-package-version", "0.60.0"),
    ("x-stainless-runtime", "node"),
    ("x-stainless-retry-count", "0"),
    ("x-stainless-timeout", "60"),
];

const TEST_SYSTEM_PROMPT: &str = "You are Claude Code, Anthropic's official CLI for Claude.";

/// `{base}/v1/messages`, tolerating a trailing slash on `base`.
pub fn messages_url(base_url: &str) -> String {
    format!("{}/v1/messages", base_url.trim_end_matches('/'))
}

/// Streaming test payload with the given output cap.
pub fn test_payload(model: &str, max_tokens: u32) -> Value {
    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [{"type": "text", "text": "hi"}]
        }],
        "system": [{"type": "text", "text": TEST_SYSTEM_PROMPT}],
        "max_tokens": max_tokens,
        "stream": true
    })
}

/// Build a Messages API request authenticated with an API key.
pub fn build_api_key_request(base_url: &str, api_key: &str, payload: &Value) -> UpstreamRequest {
    let mut request = UpstreamRequest::new(messages_url(base_url), payload.to_string());
    request.set_header("content-type", "application/json");
    request.set_header("anthropic-version", API_VERSION);
    request.set_header("anthropic-beta", DEFAULT_BETA_HEADER);
    for (name, value) in CLI_HEADERS {
        request.set_header(name, *value);
    }
    request.set_header("x-api-key", api_key);
    request
}

/// Outcome of one parsed SSE line.
enum LineOutcome {
    Continue,
    Success,
    Failure(String),
}

fn classify_line(line: &str) -> LineOutcome {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return LineOutcome::Continue;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return LineOutcome::Success;
    }

    let Ok(event) = serde_json::from_str::<Value>(data) else {
        return LineOutcome::Continue;
    };

    match event.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => {
            let has_text = event
                .get("delta")
                .and_then(|d| d.get("text"))
                .and_then(Value::as_str)
                .is_some_and(|text| !text.trim().is_empty());
            if has_text {
                LineOutcome::Success
            } else {
                LineOutcome::Continue
            }
        },
        Some("message_stop") => LineOutcome::Success,
        Some("error") => {
            let message = event
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or("Unknown error");
            LineOutcome::Failure(message.to_string())
        },
        _ => LineOutcome::Continue,
    }
}

/// Longest SSE line accepted from an upstream test stream.
pub const MAX_SSE_LINE_BYTES: usize = 64 * 1024;

/// Read a test stream until it proves the account works or reports an error.
///
/// Any non-blank text delta, `message_stop`, `[DONE]` or a clean end of stream
/// counts as success. Returns the failure message otherwise, including when a
/// single line grows past [`MAX_SSE_LINE_BYTES`].
pub async fn consume_test_stream(mut body: BodyStream) -> Result<(), String> {
    let mut buffer = BytesMut::new();
    // Bytes before this offset hold no newline.
    let mut scanned = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| format!("Stream read error: {}", e))?;
        buffer.extend_from_slice(&chunk);

        while let Some(offset) = buffer[scanned..].iter().position(|b| *b == b'\n') {
            let line = buffer.split_to(scanned + offset + 1);
            scanned = 0;
            if line.len() > MAX_SSE_LINE_BYTES {
                return Err(line_too_long());
            }
            match classify_line(&String::from_utf8_lossy(&line)) {
                LineOutcome::Continue => {},
                LineOutcome::Success => return Ok(()),
                LineOutcome::Failure(message) => return Err(message),
            }
        }

        if buffer.len() > MAX_SSE_LINE_BYTES {
            return Err(line_too_long());
        }
        scanned = buffer.len();
    }

    // Unterminated trailing line.
    match classify_line(&String::from_utf8_lossy(&buffer)) {
        LineOutcome::Failure(message) => Err(message),
        LineOutcome::Continue | LineOutcome::Success => Ok(()),
    }
}

fn line_too_long() -> String {
    format!("SSE line exceeds {} bytes", MAX_SSE_LINE_BYTES)
}
