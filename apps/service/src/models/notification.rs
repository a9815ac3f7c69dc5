use serde::{Deserialize, Serialize};

pub type ChannelId = i64;

/// A notification target bound to monitors by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: ChannelId,
    pub name: String,
    /// Sender selector, e.g. `webhook` or `telegram`
    pub channel_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    pub active: bool,
}
