//! Outbound operator notifications.
//!
//! A [`Notifier`] never fails loudly: delivery problems are reported as
//! `false` and logged by the caller.

mod policy;

pub use policy::{format_date, notification_for, test_notification, Notification};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::NotifyConfig;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message. Returns whether delivery succeeded.
    async fn send(&self, subject: &str, body: &str) -> bool;
}

/// POSTs `{"subject", "body", "sent_at"}` JSON to an HTTP endpoint.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .context("failed to build webhook client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, subject: &str, body: &str) -> bool {
        let payload = json!({
            "subject": subject,
            "body": body,
            "sent_at": Utc::now().to_rfc3339(),
        });
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(%subject, "notification delivered");
                true
            }
            Ok(resp) => {
                warn!(%subject, status = %resp.status(), "notification endpoint rejected message");
                false
            }
            Err(e) => {
                warn!(%subject, error = %e, "notification delivery failed");
                false
            }
        }
    }
}

/// Stand-in used when no endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, subject: &str, _body: &str) -> bool {
        warn!(%subject, "notification endpoint not configured, skipping");
        false
    }
}

/// Notifier for the configured endpoint, or [`DisabledNotifier`].
pub fn from_config(config: &NotifyConfig) -> Result<Arc<dyn Notifier>> {
    match config.endpoint() {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url)?)),
        None => Ok(Arc::new(DisabledNotifier)),
    }
}

/// Send the fixed test message.
pub async fn send_test(notifier: &dyn Notifier) -> bool {
    let message = test_notification();
    notifier.send(&message.subject, &message.body).await
}
