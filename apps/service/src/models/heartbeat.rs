use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::monitor::MonitorId;

/// Status carried by a heartbeat
///
/// The numeric values are part of the produced record shape and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum HeartbeatStatus {
    Down = 0,
    Up = 1,
    Pending = 2,
    Maintenance = 3,
}

impl From<HeartbeatStatus> for u8 {
    fn from(status: HeartbeatStatus) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for HeartbeatStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Down),
            1 => Ok(Self::Up),
            2 => Ok(Self::Pending),
            3 => Ok(Self::Maintenance),
            other => Err(format!("invalid heartbeat status: {other}")),
        }
    }
}

impl std::fmt::Display for HeartbeatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeartbeatStatus::Down => write!(f, "down"),
            HeartbeatStatus::Up => write!(f, "up"),
            HeartbeatStatus::Pending => write!(f, "pending"),
            HeartbeatStatus::Maintenance => write!(f, "maintenance"),
        }
    }
}

/// One completed probe outcome for a monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub id: Uuid,
    pub monitor_id: MonitorId,
    pub status: HeartbeatStatus,
    pub msg: String,

    /// Round trip in milliseconds, only present for successful probes
    pub ping: Option<u64>,

    /// Seconds since the previous heartbeat of this monitor
    pub duration: u64,

    pub down_count: u32,
    pub retries: u32,

    /// True on a confirmed state transition
    pub important: bool,

    /// Start of the probe cycle
    pub time: DateTime<Utc>,

    /// Until when this heartbeat describes the monitor (next scheduled cycle)
    pub end_time: DateTime<Utc>,

    pub notified: bool,
}

impl Heartbeat {
    pub fn is_up(&self) -> bool {
        self.status == HeartbeatStatus::Up
    }
}

/// One chart bucket of the uptime read model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeStatPoint {
    pub up: u32,
    pub down: u32,
    pub avg_ping: Option<f64>,
    pub min_ping: Option<u64>,
    pub max_ping: Option<u64>,
    /// Start of the bucket
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_values() {
        assert_eq!(serde_json::to_string(&HeartbeatStatus::Down).unwrap(), "0");
        assert_eq!(serde_json::to_string(&HeartbeatStatus::Maintenance).unwrap(), "3");
        let parsed: HeartbeatStatus = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, HeartbeatStatus::Pending);
        assert!(serde_json::from_str::<HeartbeatStatus>("7").is_err());
    }

    #[test]
    fn test_stat_point_is_camel_case() {
        let point = UptimeStatPoint {
            up: 3,
            down: 1,
            avg_ping: Some(12.5),
            min_ping: Some(10),
            max_ping: Some(15),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["avgPing"], 12.5);
        assert_eq!(json["minPing"], 10);
        assert_eq!(json["maxPing"], 15);
    }
}
