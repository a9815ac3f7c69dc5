use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::scheduler::MonitoringScheduler;
use super::types::{ProbeResult, ProbeStatus};
use crate::models::MonitorId;

const TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("unknown push token")]
    UnknownToken,

    #[error("monitor is not active")]
    Inactive,
}

/// What a pushing client reports, as sent in the push URL's query
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushRequest {
    #[serde(default)]
    pub status: Option<ProbeStatus>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub ping: Option<u64>,
}

impl PushRequest {
    pub fn up() -> Self {
        Self::default()
    }

    fn into_result(self) -> ProbeResult {
        let status = self.status.unwrap_or(ProbeStatus::Up);
        let message = self.msg.filter(|msg| !msg.is_empty()).unwrap_or_else(|| "OK".to_string());
        match status {
            ProbeStatus::Up => ProbeResult::up(message, self.ping),
            ProbeStatus::Down => ProbeResult::down(message),
        }
    }
}

/// Token authenticated entry point for push monitors
#[derive(Clone)]
pub struct PushIngress {
    scheduler: MonitoringScheduler,
}

impl PushIngress {
    pub fn new(scheduler: MonitoringScheduler) -> Self {
        Self { scheduler }
    }

    pub fn submit(&self, token: &str, request: PushRequest) -> Result<MonitorId, PushError> {
        let monitor_id = self.scheduler.push(token, request.into_result())?;
        debug!(monitor_id, "Push accepted");
        Ok(monitor_id)
    }
}

/// Random token for a new push monitor
pub fn generate_push_token() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(TOKEN_LEN).map(char::from).collect()
}
