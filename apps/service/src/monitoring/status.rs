use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::types::StatusLookup;
use crate::models::{HeartbeatStatus, MonitorId};

/// Confirmed status of every scheduled monitor, read by group checkers
#[derive(Debug, Default)]
pub struct StatusBoard {
    statuses: RwLock<HashMap<MonitorId, HeartbeatStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, monitor_id: MonitorId, status: HeartbeatStatus) {
        self.statuses.write().unwrap_or_else(PoisonError::into_inner).insert(monitor_id, status);
    }

    pub fn remove(&self, monitor_id: MonitorId) {
        self.statuses.write().unwrap_or_else(PoisonError::into_inner).remove(&monitor_id);
    }
}

impl StatusLookup for StatusBoard {
    fn status_of(&self, monitor_id: MonitorId) -> Option<HeartbeatStatus> {
        self.statuses.read().unwrap_or_else(PoisonError::into_inner).get(&monitor_id).copied()
    }
}
