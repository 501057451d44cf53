//! DingTalk-compatible robot webhook.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use gatepool_types::models::DingtalkConfig;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use url::Url;

use super::{AlertError, AlertSink, ALERT_SEND_TIMEOUT};
use crate::utils::text::escape_inline_code;

type HmacSha256 = Hmac<Sha256>;

pub struct DingtalkSink {
    config: DingtalkConfig,
    client: reqwest::Client,
}

impl DingtalkSink {
    pub fn new(config: DingtalkConfig) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder()
            .timeout(ALERT_SEND_TIMEOUT)
            .build()
            .map_err(|e| AlertError::Request(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn at_mobiles(&self) -> Vec<&str> {
        self.config.at_mobiles.iter().map(|m| m.trim()).filter(|m| !m.is_empty()).collect()
    }

    /// Prefix the title and text with the environment tag, once.
    fn apply_env_tag(&self, title: &str, text: &str) -> (String, String) {
        let env = escape_inline_code(&self.config.env);
        if env.is_empty() {
            return (title.to_string(), text.to_string());
        }

        let prefix = format!("【{}】", env);
        let title = title.trim();
        let title = if title.starts_with(&prefix) {
            title.to_string()
        } else {
            format!("{}{}", prefix, title)
        };

        let env_line = format!("**Environment**: `{}`  \n\n", env);
        let text = if text.trim().is_empty() {
            env_line
        } else if text.starts_with(&env_line) {
            text.to_string()
        } else {
            format!("{}{}", env_line, text)
        };
        (title, text)
    }
}

#[async_trait]
impl AlertSink for DingtalkSink {
    fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    async fn send_markdown(&self, title: &str, text: &str) -> Result<(), AlertError> {
        let Some(webhook) = self.config.webhook_url.as_deref().filter(|_| self.is_enabled()) else {
            return Ok(());
        };
        let endpoint = signed_webhook_url(
            webhook,
            &self.config.secret,
            chrono::Utc::now().timestamp_millis(),
        )?;
        let (title, text) = self.apply_env_tag(title, text);

        let payload = json!({
            "msgtype": "markdown",
            "markdown": {"title": title, "text": text},
            "at": {"atMobiles": self.at_mobiles(), "isAtAll": self.config.at_all},
        });

        let response = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AlertError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// `base64(HMAC-SHA256(secret, "<timestamp_ms>\n<secret>"))`.
pub fn sign(timestamp_ms: i64, secret: &str) -> Result<String, AlertError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AlertError::Signing(e.to_string()))?;
    mac.update(format!("{}\n{}", timestamp_ms, secret).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Webhook URL with `timestamp` and `sign` query parameters when `secret` is set.
///
/// Existing `timestamp`/`sign` parameters are replaced; others are kept.
pub fn signed_webhook_url(
    raw: &str,
    secret: &str,
    timestamp_ms: i64,
) -> Result<String, AlertError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AlertError::InvalidWebhook("missing webhook url".to_string()));
    }
    let secret = secret.trim();
    if secret.is_empty() {
        return Ok(raw.to_string());
    }

    let mut url = Url::parse(raw).map_err(|e| AlertError::InvalidWebhook(e.to_string()))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "timestamp" && key != "sign")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let signature = sign(timestamp_ms, secret)?;

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("timestamp", &timestamp_ms.to_string())
        .append_pair("sign", &signature);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(env: &str) -> DingtalkSink {
        DingtalkSink::new(DingtalkConfig {
            enabled: true,
            env: env.to_string(),
            webhook_url: Some("https://oapi.dingtalk.com/robot/send?access_token=t".into()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_sign_known_vector() {
        assert_eq!(
            sign(1_700_000_000_000, "SECtest").unwrap(),
            "aZLLrriXgn05YbwaGR7knYsLeJADjr9NwLaNNKpxh4g="
        );
    }

    #[test]
    fn test_signed_url_replaces_existing_params() {
        let url = signed_webhook_url(
            "https://oapi.dingtalk.com/robot/send?access_token=t&timestamp=1&sign=old",
            " SECtest ",
            1_700_000_000_000,
        )
        .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("access_token".to_string(), "t".to_string()),
                ("timestamp".to_string(), "1700000000000".to_string()),
                ("sign".to_string(), "aZLLrriXgn05YbwaGR7knYsLeJADjr9NwLaNNKpxh4g=".to_string()),
            ]
        );
    }

    #[test]
    fn test_unsigned_url_and_errors() {
        assert_eq!(signed_webhook_url(" https://hook/x ", "", 1).unwrap(), "https://hook/x");
        assert!(matches!(signed_webhook_url("  ", "s", 1), Err(AlertError::InvalidWebhook(_))));
        assert!(matches!(signed_webhook_url("nope", "s", 1), Err(AlertError::InvalidWebhook(_))));
    }

    #[test]
    fn test_env_tag_applied_once() {
        let sink = sink("prod`1");
        let (title, text) = sink.apply_env_tag("Alert", "body");
        assert_eq!(title, "【prod'1】Alert");
        assert_eq!(text, "**Environment**: `prod'1`  \n\nbody");

        let (title_again, text_again) = sink.apply_env_tag(&title, &text);
        assert_eq!(title_again, title);
        assert_eq!(text_again, text);
    }

    #[test]
    fn test_no_env_tag_when_blank() {
        let (title, text) = sink("  ").apply_env_tag("Alert", "body");
        assert_eq!((title.as_str(), text.as_str()), ("Alert", "body"));
    }

    #[test]
    fn test_at_mobiles_trimmed() {
        let mut config = sink("").config.clone();
        config.at_mobiles = vec![" 138 ".into(), "".into(), "139".into()];
        let sink = DingtalkSink::new(config).unwrap();
        assert_eq!(sink.at_mobiles(), vec!["138", "139"]);
    }
}
