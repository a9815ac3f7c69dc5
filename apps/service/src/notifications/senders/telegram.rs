use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{NotificationProvider, SenderError, channel_config, ensure_success};
use crate::models::NotificationChannel;
use crate::notifications::NotificationMessage;

const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct TelegramConfig {
    bot_token: String,
    chat_id: String,
    /// Override for self-hosted Bot API servers
    #[serde(default)]
    api_url: Option<String>,
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// A sender for pushing notifications via the Telegram Bot API.
pub struct TelegramSender {
    client: Client,
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramSender {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

/// Escapes text for Telegram MarkdownV2.
fn escape_markdown_v2(text: &str) -> String {
    let mut escaped_text = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|' | '{' | '}' | '.' | '!'
                | '\\'
        ) {
            escaped_text.push('\\');
        }
        escaped_text.push(c);
    }
    escaped_text
}

#[async_trait]
impl NotificationProvider for TelegramSender {
    async fn send(&self, channel: &NotificationChannel, message: &NotificationMessage) -> Result<(), SenderError> {
        let config: TelegramConfig = channel_config(channel)?;
        let base = config.api_url.as_deref().unwrap_or(DEFAULT_API_URL).trim_end_matches('/');
        let api_url = format!("{base}/bot{}/sendMessage", config.bot_token);

        let escaped_message = escape_markdown_v2(&message.summary());
        let payload = TelegramMessage { chat_id: &config.chat_id, text: &escaped_message, parse_mode: "MarkdownV2" };

        let response = self.client.post(&api_url).json(&payload).send().await?;
        ensure_success("Telegram API", response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markdown_v2() {
        assert_eq!(escape_markdown_v2("[api] [Down] 1.2"), "\\[api\\] \\[Down\\] 1\\.2");
        assert_eq!(escape_markdown_v2("plain text"), "plain text");
        assert_eq!(escape_markdown_v2("a\\b"), "a\\\\b");
    }
}
