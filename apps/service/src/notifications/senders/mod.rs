use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::NotificationMessage;
use crate::models::NotificationChannel;

pub mod telegram;
pub mod webhook;

pub use telegram::TelegramSender;
pub use webhook::WebhookSender;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Delivers a notification to one channel type
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    async fn send(&self, channel: &NotificationChannel, message: &NotificationMessage) -> Result<(), SenderError>;
}

/// Providers keyed by channel type
#[derive(Clone, Default)]
pub struct SenderRegistry {
    providers: HashMap<String, Arc<dyn NotificationProvider>>,
}

impl SenderRegistry {
    /// Registry with the built-in providers
    pub fn with_defaults() -> Self {
        Self::default()
            .with_provider("webhook", WebhookSender::new())
            .with_provider("telegram", TelegramSender::new())
    }

    pub fn with_provider(mut self, channel_type: impl Into<String>, provider: impl NotificationProvider + 'static) -> Self {
        self.providers.insert(channel_type.into(), Arc::new(provider));
        self
    }

    pub fn get(&self, channel_type: &str) -> Option<Arc<dyn NotificationProvider>> {
        self.providers.get(channel_type).cloned()
    }
}

/// Deserialize a channel's config for a specific provider
pub(crate) fn channel_config<T: DeserializeOwned>(channel: &NotificationChannel) -> Result<T, SenderError> {
    serde_json::from_value(channel.config.clone())
        .map_err(|e| SenderError::InvalidConfiguration(format!("channel {}: {e}", channel.id)))
}

/// Turn a non-success response into a `SendFailed` carrying the body
pub(crate) async fn ensure_success(service: &str, response: reqwest::Response) -> Result<(), SenderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let error_body = response.text().await.unwrap_or_else(|_| "Failed to read error body".to_string());
    Err(SenderError::SendFailed(format!("{service} returned non-success status: {status}. Body: {error_body}")))
}
