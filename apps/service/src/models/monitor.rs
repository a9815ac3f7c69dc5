use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::notification::ChannelId;

pub type MonitorId = i64;

/// Point-in-time snapshot of a monitor definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: MonitorId,
    pub name: String,

    /// Type string selecting the checker, e.g. `http`, `tcp`, `push`
    pub monitor_type: String,

    /// Checker-specific configuration, validated by the matching checker
    #[serde(default)]
    pub config: serde_json::Value,

    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_interval_seconds: u64,

    /// Confirmed-Down beats between repeated notifications, 0 disables resends
    #[serde(default)]
    pub resend_interval: u32,

    pub active: bool,

    #[serde(default)]
    pub notification_ids: Vec<ChannelId>,

    #[serde(default)]
    pub push_token: Option<String>,
}

impl Monitor {
    /// Create a monitor with the default schedule (60s interval, 48s timeout, no retries)
    pub fn new(id: MonitorId, name: impl Into<String>, monitor_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            monitor_type: monitor_type.into(),
            config: serde_json::Value::Object(Default::default()),
            interval_seconds: 60,
            timeout_seconds: 48,
            max_retries: 0,
            retry_interval_seconds: 60,
            resend_interval: 0,
            active: true,
            notification_ids: Vec::new(),
            push_token: None,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_seconds)
    }

    pub fn is_push(&self) -> bool {
        self.monitor_type == "push"
    }
}

/// Externally declared period during which a monitor's status evaluation is suspended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub monitor_id: MonitorId,
    pub starts_at: DateTime<Utc>,
    /// `None` keeps the window open until it is removed
    pub ends_at: Option<DateTime<Utc>>,
}

impl MaintenanceWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.starts_at && self.ends_at.is_none_or(|end| at < end)
    }
}
