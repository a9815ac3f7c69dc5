use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// Maps tokio instants to heartbeat timestamps
#[derive(Debug, Clone, Copy, Default)]
pub enum HeartbeatClock {
    /// Read the system clock on every call, so timestamps follow NTP steps
    /// and suspends instead of drifting from a fixed anchor
    #[default]
    Wall,
    /// Fixed anchor advanced by tokio time, for runs under paused time
    Anchored { base_instant: Instant, base_utc: DateTime<Utc> },
}

impl HeartbeatClock {
    pub fn anchored() -> Self {
        Self::anchored_at(Utc::now())
    }

    pub fn anchored_at(base_utc: DateTime<Utc>) -> Self {
        Self::Anchored { base_instant: Instant::now(), base_utc }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.at(Instant::now())
    }

    /// Wall time of `instant`, which is expected to be in the recent past
    pub fn at(&self, instant: Instant) -> DateTime<Utc> {
        match *self {
            Self::Wall => Utc::now() - delta(Instant::now().saturating_duration_since(instant)),
            Self::Anchored { base_instant, base_utc } => base_utc + delta(instant.saturating_duration_since(base_instant)),
        }
    }
}

fn delta(elapsed: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::zero())
}
