use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{HeartbeatStore, MonitorSource, Page, StorageError, TimeRange};
use crate::models::{ChannelId, Heartbeat, MaintenanceWindow, Monitor, MonitorId, NotificationChannel};

#[derive(Default)]
struct Tables {
    monitors: BTreeMap<MonitorId, Monitor>,
    channels: HashMap<ChannelId, NotificationChannel>,
    windows: Vec<MaintenanceWindow>,
    /// Per monitor, ordered by time
    heartbeats: HashMap<MonitorId, Vec<Heartbeat>>,
}

/// In-memory store for tests and ephemeral deployments
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_monitor(&self, monitor: Monitor) {
        self.tables.write().await.monitors.insert(monitor.id, monitor);
    }

    pub async fn remove_monitor(&self, monitor_id: MonitorId) {
        let mut tables = self.tables.write().await;
        tables.monitors.remove(&monitor_id);
        tables.windows.retain(|window| window.monitor_id != monitor_id);
    }

    pub async fn upsert_channel(&self, channel: NotificationChannel) {
        self.tables.write().await.channels.insert(channel.id, channel);
    }

    pub async fn add_maintenance_window(&self, window: MaintenanceWindow) {
        self.tables.write().await.windows.push(window);
    }

    /// Every stored heartbeat of a monitor, oldest first
    pub async fn heartbeats(&self, monitor_id: MonitorId) -> Vec<Heartbeat> {
        self.tables.read().await.heartbeats.get(&monitor_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl HeartbeatStore for MemoryStore {
    async fn append(&self, heartbeat: &Heartbeat) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let beats = tables.heartbeats.entry(heartbeat.monitor_id).or_default();
        let at = beats.partition_point(|existing| existing.time <= heartbeat.time);
        for earlier in beats[..at].iter_mut().filter(|earlier| earlier.time < heartbeat.time) {
            earlier.end_time = earlier.end_time.min(heartbeat.time);
        }
        beats.insert(at, heartbeat.clone());
        Ok(())
    }

    async fn query(&self, monitor_id: MonitorId, range: TimeRange, page: Page) -> Result<Vec<Heartbeat>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .heartbeats
            .get(&monitor_id)
            .map(|beats| {
                beats
                    .iter()
                    .filter(|hb| range.contains(hb.time))
                    .skip(page.offset)
                    .take(page.limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn latest_before(&self, monitor_id: MonitorId, at: DateTime<Utc>) -> Result<Option<Heartbeat>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .heartbeats
            .get(&monitor_id)
            .and_then(|beats| beats.iter().rev().find(|hb| hb.time < at))
            .cloned())
    }

    async fn latest(&self, monitor_id: MonitorId) -> Result<Option<Heartbeat>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.heartbeats.get(&monitor_id).and_then(|beats| beats.last()).cloned())
    }

    async fn latest_important(&self, monitor_id: MonitorId) -> Result<Option<Heartbeat>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .heartbeats
            .get(&monitor_id)
            .and_then(|beats| beats.iter().rev().find(|hb| hb.important))
            .cloned())
    }

    async fn mark_notified(&self, heartbeat_id: Uuid) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if let Some(hb) = tables.heartbeats.values_mut().flatten().find(|hb| hb.id == heartbeat_id) {
            hb.notified = true;
        }
        Ok(())
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        let mut pruned = 0;
        for beats in tables.heartbeats.values_mut() {
            let before = beats.len();
            beats.retain(|hb| hb.time >= cutoff);
            pruned += (before - beats.len()) as u64;
        }
        Ok(pruned)
    }
}

#[async_trait]
impl MonitorSource for MemoryStore {
    async fn active_monitors(&self) -> Result<Vec<Monitor>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.monitors.values().filter(|m| m.active).cloned().collect())
    }

    async fn monitor(&self, monitor_id: MonitorId) -> Result<Option<Monitor>, StorageError> {
        Ok(self.tables.read().await.monitors.get(&monitor_id).cloned())
    }

    async fn notification_channels(&self, ids: &[ChannelId]) -> Result<Vec<NotificationChannel>, StorageError> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.channels.get(id)).cloned().collect())
    }

    async fn maintenance_windows(&self) -> Result<Vec<MaintenanceWindow>, StorageError> {
        Ok(self.tables.read().await.windows.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HeartbeatStatus;
    use chrono::TimeDelta;

    fn beat(time: DateTime<Utc>, important: bool) -> Heartbeat {
        Heartbeat {
            id: Uuid::new_v4(),
            monitor_id: 1,
            status: HeartbeatStatus::Up,
            msg: String::new(),
            ping: None,
            duration: 0,
            down_count: 0,
            retries: 0,
            important,
            time,
            end_time: time + TimeDelta::seconds(60),
            notified: false,
        }
    }

    #[tokio::test]
    async fn test_append_closes_previous_heartbeat() {
        let store = MemoryStore::new();
        let base = Utc::now();
        store.append(&beat(base, true)).await.unwrap();
        store.append(&beat(base + TimeDelta::seconds(10), false)).await.unwrap();

        let beats = store.heartbeats(1).await;
        assert_eq!(beats[0].end_time, beats[1].time);
        assert_eq!(beats[1].end_time, base + TimeDelta::seconds(70));

        let other = Heartbeat { monitor_id: 2, ..beat(base + TimeDelta::seconds(5), false) };
        store.append(&other).await.unwrap();
        assert_eq!(store.heartbeats(1).await, beats);
    }

    #[tokio::test]
    async fn test_appends_stay_time_ordered() {
        let store = MemoryStore::new();
        let base = Utc::now();
        let late = beat(base + TimeDelta::seconds(60), false);
        let early = beat(base, true);

        store.append(&late).await.unwrap();
        store.append(&early).await.unwrap();

        assert_eq!(store.heartbeats(1).await, vec![early.clone(), late.clone()]);
        assert_eq!(store.latest(1).await.unwrap(), Some(late.clone()));
        assert_eq!(store.latest_important(1).await.unwrap(), Some(early.clone()));
        assert_eq!(store.latest_before(1, late.time).await.unwrap(), Some(early.clone()));

        let page = store
            .query(1, TimeRange::new(base, base + TimeDelta::hours(1)), Page { offset: 1, limit: 5 })
            .await
            .unwrap();
        assert_eq!(page, vec![late]);

        assert_eq!(store.prune_before(base + TimeDelta::seconds(1)).await.unwrap(), 1);
        assert!(store.latest_important(1).await.unwrap().is_none());
    }
}
