//! Heartbeat state machine.
//!
//! Pure decision logic: given the monitor's prior state, what was observed
//! this cycle, and the monitor's retry policy, decide the heartbeat fields and
//! the cadence of the next cycle. Nothing here touches time, I/O or the store.

use super::types::ProbeStatus;
use crate::models::{Heartbeat, HeartbeatStatus, Monitor};

/// Which interval the scheduler waits before the next cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Normal,
    Retry,
}

/// What a cycle observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Probe(ProbeStatus),
    /// The monitor is inside a maintenance window and was not probed
    Maintenance,
}

/// Per-monitor state carried between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorState {
    /// Last confirmed status, only ever Up, Down or Pending
    pub confirmed: HeartbeatStatus,
    pub retries: u32,
    pub down_count: u32,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self { confirmed: HeartbeatStatus::Pending, retries: 0, down_count: 0 }
    }
}

impl MonitorState {
    /// Rebuild the state from persisted history.
    ///
    /// The confirmed status comes from the newest important heartbeat. When
    /// retention has pruned every important heartbeat it is read back from the
    /// newest heartbeat instead.
    pub fn restore(latest: Option<&Heartbeat>, latest_important: Option<&Heartbeat>, policy: RetryPolicy) -> Self {
        let Some(latest) = latest else {
            return Self::default();
        };

        let confirmed = match latest_important.map(|hb| hb.status) {
            Some(status @ (HeartbeatStatus::Up | HeartbeatStatus::Down)) => status,
            Some(_) => HeartbeatStatus::Pending,
            None => confirmed_from(latest, policy),
        };

        Self { confirmed, retries: latest.retries, down_count: latest.down_count }
    }
}

fn confirmed_from(latest: &Heartbeat, policy: RetryPolicy) -> HeartbeatStatus {
    match latest.status {
        HeartbeatStatus::Up => HeartbeatStatus::Up,
        HeartbeatStatus::Down if latest.retries > policy.max_retries => HeartbeatStatus::Down,
        _ if latest.down_count > 0 => HeartbeatStatus::Down,
        _ => HeartbeatStatus::Pending,
    }
}

/// The parts of a monitor the state machine reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub resend_interval: u32,
}

impl From<&Monitor> for RetryPolicy {
    fn from(monitor: &Monitor) -> Self {
        Self { max_retries: monitor.max_retries, resend_interval: monitor.resend_interval }
    }
}

/// Decision for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: HeartbeatStatus,
    pub important: bool,
    /// Repeat the Down notification even though nothing changed
    pub resend: bool,
    pub cadence: Cadence,
    /// State to carry into the next cycle once the heartbeat is stored
    pub next: MonitorState,
}

impl Transition {
    pub fn should_notify(&self) -> bool {
        self.status != HeartbeatStatus::Maintenance && (self.important || self.resend)
    }
}

pub fn transition(state: &MonitorState, observation: Observation, policy: RetryPolicy) -> Transition {
    match observation {
        Observation::Maintenance => Transition {
            status: HeartbeatStatus::Maintenance,
            important: false,
            resend: false,
            cadence: Cadence::Normal,
            next: MonitorState { retries: 0, ..*state },
        },

        Observation::Probe(ProbeStatus::Up) => Transition {
            status: HeartbeatStatus::Up,
            important: state.confirmed != HeartbeatStatus::Up,
            resend: false,
            cadence: Cadence::Normal,
            next: MonitorState { confirmed: HeartbeatStatus::Up, retries: 0, down_count: 0 },
        },

        Observation::Probe(ProbeStatus::Down) => {
            let retries = state.retries.saturating_add(1);

            if retries <= policy.max_retries {
                return Transition {
                    status: HeartbeatStatus::Down,
                    important: false,
                    resend: false,
                    cadence: Cadence::Retry,
                    next: MonitorState { retries, ..*state },
                };
            }

            let down_count = state.down_count.saturating_add(1);
            let important = state.confirmed != HeartbeatStatus::Down;
            let resend = !important
                && policy.resend_interval > 0
                && down_count > 1
                && (down_count - 1) % policy.resend_interval == 0;

            Transition {
                status: HeartbeatStatus::Down,
                important,
                resend,
                cadence: Cadence::Normal,
                next: MonitorState { confirmed: HeartbeatStatus::Down, retries, down_count },
            }
        }
    }
}
