//! Operator alerts over a chat-ops webhook.
//!
//! Alerts are best-effort: they are rendered synchronously, then sent on a
//! detached task with its own deadline so a slow webhook never holds up the
//! monitor loop. Send failures are logged and dropped.

mod account_alert;
mod dingtalk;
mod message;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub use account_alert::{build_account_error_message, AccountAlertService, ACCOUNT_ALERT_COOLDOWN};
pub use dingtalk::{sign, signed_webhook_url, DingtalkSink};
pub use message::MonitorAlert;

/// Deadline for one webhook delivery.
pub const ALERT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
/// Deliveries allowed in flight at once; the rest wait for a slot.
const MAX_IN_FLIGHT_ALERTS: usize = 8;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AlertError {
    #[error("webhook request failed: {0}")]
    Request(String),
    #[error("webhook returned status {0}")]
    Status(u16),
    #[error("invalid webhook url: {0}")]
    InvalidWebhook(String),
    #[error("failed to sign webhook url: {0}")]
    Signing(String),
}

/// Destination for markdown alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Whether sends would go anywhere. Disabled sinks are skipped silently.
    fn is_enabled(&self) -> bool;

    async fn send_markdown(&self, title: &str, text: &str) -> Result<(), AlertError>;
}

/// Fire-and-forget dispatcher in front of an [`AlertSink`].
#[derive(Clone)]
pub struct AlertNotifier {
    sink: Option<Arc<dyn AlertSink>>,
    permits: Arc<Semaphore>,
}

impl AlertNotifier {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink: Some(sink), permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT_ALERTS)) }
    }

    pub fn disabled() -> Self {
        Self { sink: None, permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT_ALERTS)) }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.as_ref().is_some_and(|sink| sink.is_enabled())
    }

    /// Render and send a monitor transition alert.
    pub fn notify(&self, alert: &MonitorAlert) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            return None;
        }
        let (title, text) = alert.render();
        self.dispatch(alert.account_id(), title, text)
    }

    /// Send a pre-rendered alert on a detached task.
    ///
    /// Returns the task handle, or `None` when no enabled sink is configured.
    pub fn dispatch(&self, account_id: i64, title: String, text: String) -> Option<JoinHandle<()>> {
        let sink = self.sink.clone().filter(|sink| sink.is_enabled())?;
        let permits = self.permits.clone();

        Some(tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            match tokio::time::timeout(ALERT_SEND_TIMEOUT, sink.send_markdown(&title, &text)).await
            {
                Ok(Ok(())) => tracing::debug!(account_id, "Alert delivered"),
                Ok(Err(e)) => tracing::warn!(account_id, error = %e, "Alert delivery failed"),
                Err(_) => tracing::warn!(
                    account_id,
                    timeout = ?ALERT_SEND_TIMEOUT,
                    "Alert delivery timed out"
                ),
            }
        }))
    }
}

impl std::fmt::Debug for AlertNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertNotifier").field("enabled", &self.is_enabled()).finish()
    }
}
