use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use uuid::Uuid;

use super::{HeartbeatStore, MonitorSource, Page, StorageError, TimeRange};
use crate::models::{
    ChannelId, Heartbeat, HeartbeatStatus, MaintenanceWindow, Monitor, MonitorId, NotificationChannel,
};
use crate::pool::{LibsqlManager, LibsqlPool};

const MONITOR_COLUMNS: &str = "id, name, monitor_type, config, interval_seconds, timeout_seconds, max_retries, \
     retry_interval_seconds, resend_interval, active, push_token";

const HEARTBEAT_COLUMNS: &str =
    "id, monitor_id, status, msg, ping, duration, down_count, retries, important, time, end_time, notified";

/// LibSQL implementation of both storage traits
pub struct LibsqlRepository {
    pool: LibsqlPool,
}

impl LibsqlRepository {
    /// Create a new repository from a pool
    pub fn new(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StorageError> {
        Ok(self.pool.get().await?)
    }

    /// Insert or replace a monitor together with its channel bindings
    pub async fn save_monitor(&self, monitor: &Monitor) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        let config = serde_json::to_string(&monitor.config).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        let tx = conn.transaction().await?;
        tx.execute(
            "INSERT INTO monitors (id, name, monitor_type, config, interval_seconds, timeout_seconds, max_retries, \
             retry_interval_seconds, resend_interval, active, push_token) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, monitor_type = excluded.monitor_type, \
             config = excluded.config, interval_seconds = excluded.interval_seconds, \
             timeout_seconds = excluded.timeout_seconds, max_retries = excluded.max_retries, \
             retry_interval_seconds = excluded.retry_interval_seconds, resend_interval = excluded.resend_interval, \
             active = excluded.active, push_token = excluded.push_token",
            params![
                monitor.id,
                monitor.name.clone(),
                monitor.monitor_type.clone(),
                config,
                monitor.interval_seconds as i64,
                monitor.timeout_seconds as i64,
                monitor.max_retries as i64,
                monitor.retry_interval_seconds as i64,
                monitor.resend_interval as i64,
                monitor.active as i64,
                monitor.push_token.clone()
            ],
        )
        .await?;

        tx.execute("DELETE FROM monitor_notifications WHERE monitor_id = ?", params![monitor.id]).await?;
        for channel_id in &monitor.notification_ids {
            tx.execute(
                "INSERT OR IGNORE INTO monitor_notifications (monitor_id, channel_id) VALUES (?, ?)",
                params![monitor.id, *channel_id],
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_monitor(&self, monitor_id: MonitorId) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        conn.execute("DELETE FROM monitor_notifications WHERE monitor_id = ?", params![monitor_id]).await?;
        conn.execute("DELETE FROM maintenance_windows WHERE monitor_id = ?", params![monitor_id]).await?;
        conn.execute("DELETE FROM monitors WHERE id = ?", params![monitor_id]).await?;
        Ok(())
    }

    pub async fn save_channel(&self, channel: &NotificationChannel) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        let config = serde_json::to_string(&channel.config).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        conn.execute(
            "INSERT INTO notification_channels (id, name, channel_type, config, active) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, channel_type = excluded.channel_type, \
             config = excluded.config, active = excluded.active",
            params![channel.id, channel.name.clone(), channel.channel_type.clone(), config, channel.active as i64],
        )
        .await?;
        Ok(())
    }

    pub async fn add_maintenance_window(&self, window: &MaintenanceWindow) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO maintenance_windows (monitor_id, starts_at, ends_at) VALUES (?, ?, ?)",
            params![window.monitor_id, to_millis(window.starts_at), window.ends_at.map(to_millis)],
        )
        .await?;
        Ok(())
    }

    async fn monitor_channels(&self, monitor_id: MonitorId) -> Result<Vec<ChannelId>, StorageError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT channel_id FROM monitor_notifications WHERE monitor_id = ? ORDER BY channel_id",
                params![monitor_id],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<i64>(0)?);
        }
        Ok(ids)
    }

    async fn heartbeats(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Heartbeat>, StorageError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;

        let mut heartbeats = Vec::new();
        while let Some(row) = rows.next().await? {
            heartbeats.push(heartbeat_from_row(&row)?);
        }
        Ok(heartbeats)
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StorageError::Corrupt(format!("timestamp out of range: {millis}")))
}

fn monitor_from_row(row: &Row) -> Result<Monitor, StorageError> {
    let config: String = row.get(3)?;

    Ok(Monitor {
        id: row.get(0)?,
        name: row.get(1)?,
        monitor_type: row.get(2)?,
        config: serde_json::from_str(&config).map_err(|e| StorageError::Corrupt(format!("monitor config: {e}")))?,
        interval_seconds: row.get::<i64>(4)? as u64,
        timeout_seconds: row.get::<i64>(5)? as u64,
        max_retries: row.get::<i64>(6)? as u32,
        retry_interval_seconds: row.get::<i64>(7)? as u64,
        resend_interval: row.get::<i64>(8)? as u32,
        active: row.get::<i64>(9)? != 0,
        notification_ids: Vec::new(),
        push_token: row.get(10)?,
    })
}

fn heartbeat_from_row(row: &Row) -> Result<Heartbeat, StorageError> {
    let id: String = row.get(0)?;
    let status = row.get::<i64>(2)?;

    Ok(Heartbeat {
        id: Uuid::parse_str(&id).map_err(|e| StorageError::Corrupt(format!("heartbeat id: {e}")))?,
        monitor_id: row.get(1)?,
        status: u8::try_from(status)
            .map_err(|e| e.to_string())
            .and_then(HeartbeatStatus::try_from)
            .map_err(StorageError::Corrupt)?,
        msg: row.get(3)?,
        ping: row.get::<Option<i64>>(4)?.map(|ping| ping as u64),
        duration: row.get::<i64>(5)? as u64,
        down_count: row.get::<i64>(6)? as u32,
        retries: row.get::<i64>(7)? as u32,
        important: row.get::<i64>(8)? != 0,
        time: from_millis(row.get(9)?)?,
        end_time: from_millis(row.get(10)?)?,
        notified: row.get::<i64>(11)? != 0,
    })
}

#[async_trait]
impl HeartbeatStore for LibsqlRepository {
    async fn append(&self, heartbeat: &Heartbeat) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        let time = to_millis(heartbeat.time);

        let tx = conn.transaction().await?;
        tx.execute(
            "UPDATE heartbeats SET end_time = ?1 WHERE monitor_id = ?2 AND time < ?1 AND end_time > ?1",
            params![time, heartbeat.monitor_id],
        )
        .await?;
        tx.execute(
            &format!("INSERT INTO heartbeats ({HEARTBEAT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                heartbeat.id.to_string(),
                heartbeat.monitor_id,
                u8::from(heartbeat.status) as i64,
                heartbeat.msg.clone(),
                heartbeat.ping.map(|ping| ping as i64),
                heartbeat.duration as i64,
                heartbeat.down_count as i64,
                heartbeat.retries as i64,
                heartbeat.important as i64,
                time,
                to_millis(heartbeat.end_time),
                heartbeat.notified as i64
            ],
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, monitor_id: MonitorId, range: TimeRange, page: Page) -> Result<Vec<Heartbeat>, StorageError> {
        self.heartbeats(
            &format!(
                "SELECT {HEARTBEAT_COLUMNS} FROM heartbeats WHERE monitor_id = ? AND time >= ? AND time < ? \
                 ORDER BY time ASC LIMIT ? OFFSET ?"
            ),
            params![monitor_id, to_millis(range.start), to_millis(range.end), page.limit as i64, page.offset as i64],
        )
        .await
    }

    async fn latest_before(&self, monitor_id: MonitorId, at: DateTime<Utc>) -> Result<Option<Heartbeat>, StorageError> {
        let mut found = self
            .heartbeats(
                &format!(
                    "SELECT {HEARTBEAT_COLUMNS} FROM heartbeats WHERE monitor_id = ? AND time < ? \
                     ORDER BY time DESC LIMIT 1"
                ),
                params![monitor_id, to_millis(at)],
            )
            .await?;
        Ok(found.pop())
    }

    async fn latest(&self, monitor_id: MonitorId) -> Result<Option<Heartbeat>, StorageError> {
        let mut found = self
            .heartbeats(
                &format!("SELECT {HEARTBEAT_COLUMNS} FROM heartbeats WHERE monitor_id = ? ORDER BY time DESC LIMIT 1"),
                params![monitor_id],
            )
            .await?;
        Ok(found.pop())
    }

    async fn latest_important(&self, monitor_id: MonitorId) -> Result<Option<Heartbeat>, StorageError> {
        let mut found = self
            .heartbeats(
                &format!(
                    "SELECT {HEARTBEAT_COLUMNS} FROM heartbeats WHERE monitor_id = ? AND important = 1 \
                     ORDER BY time DESC LIMIT 1"
                ),
                params![monitor_id],
            )
            .await?;
        Ok(found.pop())
    }

    async fn mark_notified(&self, heartbeat_id: Uuid) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        conn.execute("UPDATE heartbeats SET notified = 1 WHERE id = ?", params![heartbeat_id.to_string()]).await?;
        Ok(())
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let conn = self.get_conn().await?;
        let deleted = conn.execute("DELETE FROM heartbeats WHERE time < ?", params![to_millis(cutoff)]).await?;
        Ok(deleted)
    }
}

#[async_trait]
impl MonitorSource for LibsqlRepository {
    async fn active_monitors(&self) -> Result<Vec<Monitor>, StorageError> {
        let mut monitors = Vec::new();
        {
            let conn = self.get_conn().await?;
            let mut rows = conn
                .query(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE active = 1 ORDER BY id"), ())
                .await?;
            while let Some(row) = rows.next().await? {
                monitors.push(monitor_from_row(&row)?);
            }
        }

        for monitor in &mut monitors {
            monitor.notification_ids = self.monitor_channels(monitor.id).await?;
        }
        Ok(monitors)
    }

    async fn monitor(&self, monitor_id: MonitorId) -> Result<Option<Monitor>, StorageError> {
        let found = {
            let conn = self.get_conn().await?;
            let mut rows = conn
                .query(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?"), params![monitor_id])
                .await?;
            match rows.next().await? {
                Some(row) => Some(monitor_from_row(&row)?),
                None => None,
            }
        };

        match found {
            Some(mut monitor) => {
                monitor.notification_ids = self.monitor_channels(monitor_id).await?;
                Ok(Some(monitor))
            }
            None => Ok(None),
        }
    }

    async fn notification_channels(&self, ids: &[ChannelId]) -> Result<Vec<NotificationChannel>, StorageError> {
        let conn = self.get_conn().await?;
        let mut channels = Vec::with_capacity(ids.len());

        for id in ids {
            let mut rows = conn
                .query(
                    "SELECT id, name, channel_type, config, active FROM notification_channels WHERE id = ?",
                    params![*id],
                )
                .await?;
            if let Some(row) = rows.next().await? {
                let config: String = row.get(3)?;
                channels.push(NotificationChannel {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    channel_type: row.get(2)?,
                    config: serde_json::from_str(&config)
                        .map_err(|e| StorageError::Corrupt(format!("channel config: {e}")))?,
                    active: row.get::<i64>(4)? != 0,
                });
            }
        }
        Ok(channels)
    }

    async fn maintenance_windows(&self) -> Result<Vec<MaintenanceWindow>, StorageError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT monitor_id, starts_at, ends_at FROM maintenance_windows", ()).await?;

        let mut windows = Vec::new();
        while let Some(row) = rows.next().await? {
            windows.push(MaintenanceWindow {
                monitor_id: row.get(0)?,
                starts_at: from_millis(row.get(1)?)?,
                ends_at: row.get::<Option<i64>>(2)?.map(from_millis).transpose()?,
            });
        }
        Ok(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::initialize_database;
    use chrono::TimeDelta;
    use serde_json::json;
    use tempfile::{TempDir, tempdir};

    async fn create_test_repository() -> anyhow::Result<(LibsqlRepository, TempDir)> {
        let dir = tempdir()?;
        let pool = crate::pool::open_pool(&dir.path().join("test.db"), 4).await?;
        let conn = pool.get().await?;
        initialize_database(&conn).await?;
        drop(conn);
        Ok((LibsqlRepository::new(pool), dir))
    }

    fn heartbeat(monitor_id: MonitorId, time: DateTime<Utc>, status: HeartbeatStatus, important: bool) -> Heartbeat {
        Heartbeat {
            id: Uuid::new_v4(),
            monitor_id,
            status,
            msg: "ok".into(),
            ping: Some(12),
            duration: 60,
            down_count: 0,
            retries: 0,
            important,
            time,
            end_time: time + TimeDelta::seconds(60),
            notified: false,
        }
    }

    #[tokio::test]
    async fn test_monitor_round_trip() -> anyhow::Result<()> {
        let (repo, _dir) = create_test_repository().await?;

        repo.save_channel(&NotificationChannel {
            id: 5,
            name: "ops".into(),
            channel_type: "webhook".into(),
            config: json!({ "url": "https://hooks.example.com/x" }),
            active: true,
        })
        .await?;

        let mut monitor = Monitor::new(1, "api", "http").with_config(json!({ "url": "https://example.com" }));
        monitor.notification_ids = vec![5];
        repo.save_monitor(&monitor).await?;

        let mut paused = Monitor::new(2, "old", "tcp");
        paused.active = false;
        repo.save_monitor(&paused).await?;

        let active = repo.active_monitors().await?;
        assert_eq!(active, vec![monitor.clone()]);
        assert_eq!(repo.monitor(2).await?.map(|m| m.active), Some(false));

        let channels = repo.notification_channels(&monitor.notification_ids).await?;
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].channel_type, "webhook");

        monitor.name = "api v2".into();
        monitor.notification_ids.clear();
        repo.save_monitor(&monitor).await?;
        assert_eq!(repo.monitor(1).await?, Some(monitor));

        repo.delete_monitor(1).await?;
        assert_eq!(repo.monitor(1).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_heartbeat_queries() -> anyhow::Result<()> {
        let (repo, _dir) = create_test_repository().await?;
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let beats: Vec<Heartbeat> = (0..5)
            .map(|i| heartbeat(1, base + TimeDelta::minutes(i), HeartbeatStatus::Up, i == 0))
            .collect();
        for beat in &beats {
            repo.append(beat).await?;
        }
        repo.append(&heartbeat(2, base, HeartbeatStatus::Down, true)).await?;

        let range = TimeRange::new(base, base + TimeDelta::minutes(10));
        let first_page = repo.query(1, range, Page::first(3)).await?;
        assert_eq!(first_page, beats[..3].to_vec());
        let second_page = repo.query(1, range, Page::first(3).next()).await?;
        assert_eq!(second_page, beats[3..].to_vec());

        assert_eq!(repo.latest(1).await?, Some(beats[4].clone()));
        assert_eq!(repo.latest_important(1).await?, Some(beats[0].clone()));
        assert_eq!(repo.latest_before(1, beats[2].time).await?, Some(beats[1].clone()));

        repo.mark_notified(beats[0].id).await?;
        assert!(repo.latest_important(1).await?.unwrap().notified);

        let pruned = repo.prune_before(base + TimeDelta::minutes(2)).await?;
        assert_eq!(pruned, 3);
        assert_eq!(repo.query(1, range, Page::first(10)).await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_append_closes_previous_heartbeat() -> anyhow::Result<()> {
        let (repo, _dir) = create_test_repository().await?;
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        repo.append(&heartbeat(1, base, HeartbeatStatus::Up, true)).await?;
        repo.append(&heartbeat(2, base, HeartbeatStatus::Up, true)).await?;
        let pushed = heartbeat(1, base + TimeDelta::seconds(10), HeartbeatStatus::Up, false);
        repo.append(&pushed).await?;

        let range = TimeRange::new(base, base + TimeDelta::hours(1));
        let beats = repo.query(1, range, Page::first(10)).await?;
        assert_eq!(beats.len(), 2);
        assert_eq!(beats[0].end_time, pushed.time);
        assert_eq!(beats[1], pushed);

        let other = repo.query(2, range, Page::first(10)).await?;
        assert_eq!(other[0].end_time, base + TimeDelta::seconds(60));
        Ok(())
    }

    #[tokio::test]
    async fn test_maintenance_windows() -> anyhow::Result<()> {
        let (repo, _dir) = create_test_repository().await?;
        repo.save_monitor(&Monitor::new(1, "api", "http")).await?;

        let starts_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let window = MaintenanceWindow { monitor_id: 1, starts_at, ends_at: None };
        repo.add_maintenance_window(&window).await?;

        assert_eq!(repo.maintenance_windows().await?, vec![window]);
        Ok(())
    }
}
