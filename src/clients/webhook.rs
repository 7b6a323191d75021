//! Webhook-backed notifier.

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info};
use url::Url;

use crate::clients::Notifier;

/// Posts notifications to a configured webhook as `{"text": message}`.
///
/// The URL is validated once at construction: it must parse as an absolute
/// URL with both a scheme and a host, otherwise every [`notify`] call is a
/// logged no-op. Delivery failures are logged and swallowed; sending a
/// notification can never fail the calling workflow.
///
/// [`notify`]: Notifier::notify
pub struct WebhookNotifier {
    url: Option<Url>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Creates a notifier for the given webhook URL, if any.
    pub fn new(webhook_url: Option<&str>) -> Self {
        let url = webhook_url.and_then(|raw| match Url::parse(raw) {
            Ok(parsed) if parsed.has_host() => Some(parsed),
            Ok(_) => {
                info!("webhook URL has no host, notifications disabled");
                None
            }
            Err(e) => {
                info!(error = %e, "webhook URL is invalid, notifications disabled");
                None
            }
        });

        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    /// True when a valid webhook URL was configured.
    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) {
        let Some(url) = &self.url else {
            info!("webhook URL is invalid or not provided, skipping notification");
            return;
        };

        let result = self
            .client
            .post(url.clone())
            .json(&json!({ "text": message }))
            .send()
            .await;

        match result {
            Ok(response) if response.status() == reqwest::StatusCode::OK => {
                info!("notification sent");
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!(%status, body, "failed to send notification");
            }
            Err(e) => {
                error!(error = %e, "failed to send notification");
            }
        }
    }
}
