use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::models::{MaintenanceWindow, MonitorId};

/// Answers whether a monitor is under maintenance at a given time
pub trait MaintenanceSchedule: Send + Sync {
    fn in_maintenance(&self, monitor_id: MonitorId, at: DateTime<Utc>) -> bool;
}

/// In-memory snapshot of maintenance windows, refreshed by the orchestrator
#[derive(Debug, Default)]
pub struct MaintenanceWindows {
    windows: RwLock<HashMap<MonitorId, Vec<MaintenanceWindow>>>,
}

impl MaintenanceWindows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a full set of windows
    pub fn replace(&self, windows: Vec<MaintenanceWindow>) {
        let mut by_monitor: HashMap<MonitorId, Vec<MaintenanceWindow>> = HashMap::new();
        for window in windows {
            by_monitor.entry(window.monitor_id).or_default().push(window);
        }
        *self.windows.write().unwrap_or_else(PoisonError::into_inner) = by_monitor;
    }

    pub fn add(&self, window: MaintenanceWindow) {
        self.windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(window.monitor_id)
            .or_default()
            .push(window);
    }

    pub fn clear(&self, monitor_id: MonitorId) {
        self.windows.write().unwrap_or_else(PoisonError::into_inner).remove(&monitor_id);
    }
}

impl MaintenanceSchedule for MaintenanceWindows {
    fn in_maintenance(&self, monitor_id: MonitorId, at: DateTime<Utc>) -> bool {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&monitor_id)
            .is_some_and(|windows| windows.iter().any(|window| window.contains(at)))
    }
}
