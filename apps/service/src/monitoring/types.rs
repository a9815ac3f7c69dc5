use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::models::{HeartbeatStatus, MonitorId};

/// Raw outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Down,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Up => write!(f, "up"),
            ProbeStatus::Down => write!(f, "down"),
        }
    }
}

/// Result of a monitoring probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    pub message: String,
    /// Response time in milliseconds
    pub ping_ms: Option<u64>,
}

impl ProbeResult {
    /// Mark the probe as successful with latency
    pub fn up(message: impl Into<String>, ping_ms: Option<u64>) -> Self {
        Self { status: ProbeStatus::Up, message: message.into(), ping_ms }
    }

    /// Mark the probe as failed
    pub fn down(message: impl Into<String>) -> Self {
        Self { status: ProbeStatus::Down, message: message.into(), ping_ms: None }
    }

    pub fn is_up(&self) -> bool {
        self.status == ProbeStatus::Up
    }
}

/// Malformed monitor configuration, reported against the offending field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid `{field}`: {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Unexpected failure inside a checker, never an expected negative outcome
#[derive(Debug, Error)]
pub enum ProbeFault {
    #[error("checker received a config it should have rejected: {0}")]
    UnvalidatedConfig(#[from] ConfigError),

    #[error("checker setup failed: {0}")]
    Setup(String),

    #[error("checker panicked: {0}")]
    Panicked(String),
}

/// Read access to the latest status of other monitors
pub trait StatusLookup: Send + Sync {
    fn status_of(&self, monitor_id: MonitorId) -> Option<HeartbeatStatus>;
}

/// Everything a checker gets besides the monitor snapshot
#[derive(Clone)]
pub struct ProbeContext {
    /// Hard deadline; the registry drops the probe when it passes
    pub deadline: Instant,
    pub timeout: Duration,
    pub statuses: Arc<dyn StatusLookup>,
}

impl ProbeContext {
    pub fn new(timeout: Duration, statuses: Arc<dyn StatusLookup>) -> Self {
        Self { deadline: Instant::now() + timeout, timeout, statuses }
    }

    /// Time left until the deadline, never zero so client timeouts stay valid
    pub fn remaining(&self) -> Duration {
        self.deadline
            .saturating_duration_since(Instant::now())
            .max(Duration::from_millis(1))
    }
}

impl std::fmt::Debug for ProbeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeContext")
            .field("deadline", &self.deadline)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Status lookup that knows nothing, for probes that do not need one
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStatuses;

impl StatusLookup for NoStatuses {
    fn status_of(&self, _monitor_id: MonitorId) -> Option<HeartbeatStatus> {
        None
    }
}
