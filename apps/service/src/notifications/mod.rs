//! Notification delivery for important heartbeats.

pub mod dispatcher;
pub mod senders;

pub use dispatcher::{DispatchReport, NotificationDispatcher, NotificationError};
pub use senders::{NotificationProvider, SenderError, SenderRegistry};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Heartbeat, HeartbeatStatus, Monitor, MonitorId};

/// What a provider gets to render, independent of the channel type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationMessage {
    pub monitor_id: MonitorId,
    pub monitor_name: String,
    pub status: HeartbeatStatus,
    pub msg: String,
    pub ping: Option<u64>,
    pub time: DateTime<Utc>,
}

impl NotificationMessage {
    pub fn new(monitor: &Monitor, heartbeat: &Heartbeat) -> Self {
        Self {
            monitor_id: monitor.id,
            monitor_name: monitor.name.clone(),
            status: heartbeat.status,
            msg: heartbeat.msg.clone(),
            ping: heartbeat.ping,
            time: heartbeat.time,
        }
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        let badge = match self.status {
            HeartbeatStatus::Up => "✅ Up",
            HeartbeatStatus::Down => "🔴 Down",
            HeartbeatStatus::Pending => "🟡 Pending",
            HeartbeatStatus::Maintenance => "🔵 Maintenance",
        };
        format!("[{}] [{badge}] {}", self.monitor_name, self.msg)
    }
}
