//! Records the engine reads and produces.
//!
//! Monitors and notification channels are owned by an external admin surface;
//! the engine only ever sees snapshots of them. Heartbeats are produced here
//! and appended to a [`crate::database::HeartbeatStore`].

pub mod heartbeat;
pub mod monitor;
pub mod notification;

pub use heartbeat::{Heartbeat, HeartbeatStatus, UptimeStatPoint};
pub use monitor::{MaintenanceWindow, Monitor, MonitorId};
pub use notification::{ChannelId, NotificationChannel};
