//! Notification handlers for alert events

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of alert event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventKind {
    Raised,
    Resolved,
}

/// An alert raise or resolution for one device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub kind: AlertEventKind,
    pub device_id: String,
    pub field: String,
    pub value: f64,
    pub threshold: f64,
    pub at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn message(&self) -> String {
        match self.kind {
            AlertEventKind::Raised => format!(
                "Device {}: {} {} exceeds threshold {}",
                self.device_id, self.field, self.value, self.threshold
            ),
            AlertEventKind::Resolved => format!(
                "Device {}: {} {} is back to normal",
                self.device_id, self.field, self.value
            ),
        }
    }
}

/// Notification target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotifyTarget {
    /// Log to tracing
    Log,
    /// HTTP webhook
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// Upper bound on a single webhook call
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Notifier for sending alert events
///
/// Dispatch runs on the evaluation path, so every webhook call is bounded by
/// `timeout`.
pub struct Notifier {
    client: reqwest::Client,
    targets: Vec<NotifyTarget>,
    timeout: Duration,
}

impl Notifier {
    /// Create a notifier that only logs
    pub fn new() -> Self {
        Self::with_targets(vec![NotifyTarget::Log])
    }

    pub fn with_targets(targets: Vec<NotifyTarget>) -> Self {
        Self {
            client: reqwest::Client::new(),
            targets,
            timeout: WEBHOOK_TIMEOUT,
        }
    }

    /// Set the per-webhook timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn targets(&self) -> &[NotifyTarget] {
        &self.targets
    }

    /// Send an event to all targets
    pub async fn notify(&self, event: &AlertEvent) -> Result<(), NotifierError> {
        let mut errors = Vec::new();

        for target in &self.targets {
            if let Err(e) = self.notify_target(target, event).await {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotifierError::Multiple(errors))
        }
    }

    /// Send an event to a single target
    async fn notify_target(
        &self,
        target: &NotifyTarget,
        event: &AlertEvent,
    ) -> Result<(), NotifierError> {
        match target {
            NotifyTarget::Log => {
                match event.kind {
                    AlertEventKind::Raised => tracing::warn!(
                        device_id = %event.device_id,
                        value = event.value,
                        threshold = event.threshold,
                        "ALERT: {}",
                        event.message()
                    ),
                    AlertEventKind::Resolved => tracing::info!(
                        device_id = %event.device_id,
                        value = event.value,
                        "RESOLVED: {}",
                        event.message()
                    ),
                }
                Ok(())
            }
            NotifyTarget::Webhook { url, headers } => self.send_webhook(url, headers, event).await,
        }
    }

    /// Send webhook notification
    async fn send_webhook(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        event: &AlertEvent,
    ) -> Result<(), NotifierError> {
        let payload = serde_json::json!({
            "event": event,
            "message": event.message(),
        });

        let mut request = self.client.post(url).timeout(self.timeout).json(&payload);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            NotifierError::Webhook(format!("Failed to send webhook: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(
            device_id = %event.device_id,
            url = %url,
            "Webhook notification sent"
        );

        Ok(())
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifierError>),
}
