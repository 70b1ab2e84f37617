//! Webhook notifier for the operations chat channel.

use async_trait::async_trait;
use punchsync_core::Notifier;
use punchsync_domain::{NotifierConfig, PunchSyncError, Result};
use reqwest::Method;
use serde_json::json;
use tracing::debug;

use crate::errors::InfraError;
use crate::http::HttpClient;

/// Posts plain-text messages to an incoming-webhook URL.
pub struct WebhookNotifier {
    http: HttpClient,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig, http: HttpClient) -> Self {
        Self { http, webhook_url: config.webhook_url.clone() }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        debug!(chars = text.len(), "posting chat notification");

        let builder = self
            .http
            .request(Method::POST, &self.webhook_url)
            .json(&json!({ "text": text }));

        let response = self.http.send(builder).await?;
        response
            .error_for_status()
            .map_err(|err| PunchSyncError::from(InfraError::from(err)))?;
        Ok(())
    }
}
