//! Operational alerts
//!
//! Alerts are fire-and-forget: raising one never blocks or fails the request
//! that triggered it. Delivery problems are logged and dropped.

use std::sync::Mutex;

use serde_json::json;
use tracing::{debug, warn};

/// Sink for operational alerts (proxy failures, exhausted provider chains)
pub trait Notifier: Send + Sync {
    /// Raise an alert without waiting for delivery
    fn alert(&self, message: String);
}

/// Writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, message: String) {
        warn!(alert = %message, "Operational alert");
    }
}

/// Posts alerts as `{"text": ...}` to a webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn alert(&self, message: String) {
        warn!(alert = %message, "Operational alert");

        // Outside a runtime there is nothing to deliver on
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, webhook alert skipped");
            return;
        };

        let client = self.client.clone();
        let url = self.url.clone();
        handle.spawn(async move {
            let result = client
                .post(&url)
                .json(&json!({ "text": message }))
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                warn!(error = %e, "Failed to deliver webhook alert");
            }
        });
    }
}

/// Keeps alerts in memory (tests, CLI diagnostics)
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    alerts: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts raised so far
    pub fn alerts(&self) -> Vec<String> {
        self.alerts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    fn alert(&self, message: String) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(message);
        }
    }
}
