use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{NotificationProvider, SenderError, channel_config, ensure_success};
use crate::models::NotificationChannel;
use crate::notifications::NotificationMessage;

#[derive(Debug, Deserialize)]
struct WebhookConfig {
    url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    /// Preformatted summary for receivers that only show text
    msg: String,
    #[serde(flatten)]
    message: &'a NotificationMessage,
}

/// A sender for pushing notifications via a custom webhook (JSON POST)
pub struct WebhookSender {
    client: Client,
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookSender {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

#[async_trait]
impl NotificationProvider for WebhookSender {
    async fn send(&self, channel: &NotificationChannel, message: &NotificationMessage) -> Result<(), SenderError> {
        let config: WebhookConfig = channel_config(channel)?;

        let mut header_map = header::HeaderMap::new();
        for (key, value) in &config.headers {
            let header_name = header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid header name: {e}")))?;
            let header_value = header::HeaderValue::from_str(value)
                .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid header value: {e}")))?;
            header_map.insert(header_name, header_value);
        }

        let payload = WebhookPayload { msg: message.summary(), message };
        let response = self.client.post(&config.url).headers(header_map).json(&payload).send().await?;

        ensure_success("Webhook", response).await
    }
}
