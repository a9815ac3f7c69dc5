//! Uptime read model computed from the persisted heartbeat stream.
//!
//! Each heartbeat covers `[time, min(end_time, next.time))`. Uptime is the
//! Up-covered time divided by the covered time that was neither Pending nor
//! Maintenance; gaps between heartbeats count on neither side.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::database::{HeartbeatStore, Page, StorageError, TimeRange};
use crate::models::{Heartbeat, HeartbeatStatus, MonitorId, UptimeStatPoint};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Chooses the chart bucket width for a window
pub trait BucketPolicy: Send + Sync {
    fn bucket_width(&self, window: TimeDelta) -> TimeDelta;
}

/// Smallest step from a fixed ladder that keeps the point count bounded
#[derive(Debug, Clone)]
pub struct SteppedBuckets {
    steps: Vec<TimeDelta>,
    max_points: usize,
}

impl SteppedBuckets {
    pub fn new(max_points: usize) -> Self {
        let steps = vec![
            TimeDelta::minutes(1),
            TimeDelta::minutes(5),
            TimeDelta::minutes(10),
            TimeDelta::minutes(30),
            TimeDelta::hours(1),
            TimeDelta::hours(3),
            TimeDelta::hours(6),
            TimeDelta::hours(12),
            TimeDelta::days(1),
        ];
        Self { steps, max_points: max_points.max(1) }
    }
}

impl Default for SteppedBuckets {
    fn default() -> Self {
        Self::new(100)
    }
}

impl BucketPolicy for SteppedBuckets {
    fn bucket_width(&self, window: TimeDelta) -> TimeDelta {
        let window_ms = window.num_milliseconds().max(0) as u64;
        let max_points = self.max_points as u64;
        if let Some(step) = self
            .steps
            .iter()
            .copied()
            .find(|step| window_ms.div_ceil(step.num_milliseconds() as u64) <= max_points)
        {
            return step;
        }

        // Past the ladder: whole days, as many as it takes to stay under the cap
        let day_ms = TimeDelta::days(1).num_milliseconds() as u64;
        let days = window_ms.div_ceil(max_points).div_ceil(day_ms).max(1);
        TimeDelta::days(days as i64)
    }
}

/// Uptime over the standard windows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeSummary {
    pub uptime_24h: Option<f64>,
    pub uptime_30d: Option<f64>,
    pub avg_ping_24h: Option<f64>,
}

pub struct UptimeAggregator {
    store: Arc<dyn HeartbeatStore>,
    policy: Arc<dyn BucketPolicy>,
    page_size: usize,
}

impl UptimeAggregator {
    pub fn new(store: Arc<dyn HeartbeatStore>) -> Self {
        Self { store, policy: Arc::new(SteppedBuckets::default()), page_size: DEFAULT_PAGE_SIZE }
    }

    pub fn with_policy(mut self, policy: Arc<dyn BucketPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fraction of time Up in `range`, `None` when nothing in the window counts
    pub async fn uptime(&self, monitor_id: MonitorId, range: TimeRange) -> Result<Option<f64>, StorageError> {
        let mut beats = Vec::new();
        if let Some(previous) = self.store.latest_before(monitor_id, range.start).await? {
            beats.push(previous);
        }
        beats.extend(self.load(monitor_id, range).await?);
        Ok(compute_uptime(&beats, range))
    }

    /// Chart buckets covering `range`, every bucket emitted even when empty
    pub async fn stat_points(&self, monitor_id: MonitorId, range: TimeRange) -> Result<Vec<UptimeStatPoint>, StorageError> {
        let width = self.policy.bucket_width(range.end - range.start);
        let beats = self.load(monitor_id, range).await?;
        Ok(compute_points(&beats, range, width))
    }

    pub async fn summary(&self, monitor_id: MonitorId, now: DateTime<Utc>) -> Result<UptimeSummary, StorageError> {
        let day = TimeRange::new(now - TimeDelta::hours(24), now);
        let month = TimeRange::new(now - TimeDelta::days(30), now);

        let day_beats = self.load(monitor_id, day).await?;
        let pings: Vec<u64> = day_beats.iter().filter_map(|hb| hb.ping).collect();
        let avg_ping_24h = average(&pings);

        Ok(UptimeSummary {
            uptime_24h: self.uptime(monitor_id, day).await?,
            uptime_30d: self.uptime(monitor_id, month).await?,
            avg_ping_24h,
        })
    }

    async fn load(&self, monitor_id: MonitorId, range: TimeRange) -> Result<Vec<Heartbeat>, StorageError> {
        let mut beats = Vec::new();
        let mut page = Page::first(self.page_size);
        loop {
            let batch = self.store.query(monitor_id, range, page).await?;
            let done = batch.len() < page.limit;
            beats.extend(batch);
            if done {
                return Ok(beats);
            }
            page = page.next();
        }
    }
}

fn average(values: &[u64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<u64>() as f64 / values.len() as f64)
}

/// `beats` must be time-ordered; a heartbeat before `range.start` may lead
pub fn compute_uptime(beats: &[Heartbeat], range: TimeRange) -> Option<f64> {
    let mut up = 0i64;
    let mut counted = 0i64;

    for (i, hb) in beats.iter().enumerate() {
        let mut end = hb.end_time.min(range.end);
        if let Some(next) = beats.get(i + 1) {
            end = end.min(next.time);
        }
        let start = hb.time.max(range.start);
        if end <= start {
            continue;
        }

        let covered = (end - start).num_milliseconds();
        match hb.status {
            HeartbeatStatus::Up => {
                up += covered;
                counted += covered;
            }
            HeartbeatStatus::Down => counted += covered,
            HeartbeatStatus::Pending | HeartbeatStatus::Maintenance => {}
        }
    }

    (counted > 0).then(|| up as f64 / counted as f64)
}

/// Bucket heartbeats by their start time
pub fn compute_points(beats: &[Heartbeat], range: TimeRange, width: TimeDelta) -> Vec<UptimeStatPoint> {
    if width <= TimeDelta::zero() || range.end <= range.start {
        return Vec::new();
    }

    let mut points = Vec::new();
    let mut bucket_start = range.start;
    let mut beats = beats.iter().filter(|hb| range.contains(hb.time)).peekable();

    while bucket_start < range.end {
        let bucket_end = (bucket_start + width).min(range.end);
        let mut point = UptimeStatPoint {
            up: 0,
            down: 0,
            avg_ping: None,
            min_ping: None,
            max_ping: None,
            timestamp: bucket_start,
        };
        let mut pings = Vec::new();

        while let Some(hb) = beats.next_if(|hb| hb.time < bucket_end) {
            match hb.status {
                HeartbeatStatus::Up => point.up += 1,
                HeartbeatStatus::Down => point.down += 1,
                HeartbeatStatus::Pending | HeartbeatStatus::Maintenance => {}
            }
            if let Some(ping) = hb.ping {
                pings.push(ping);
            }
        }

        point.avg_ping = average(&pings);
        point.min_ping = pings.iter().copied().min();
        point.max_ping = pings.iter().copied().max();
        points.push(point);
        bucket_start = bucket_end;
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn beat(offset_secs: i64, len_secs: i64, status: HeartbeatStatus, ping: Option<u64>) -> Heartbeat {
        let time = t0() + TimeDelta::seconds(offset_secs);
        Heartbeat {
            id: Uuid::new_v4(),
            monitor_id: 1,
            status,
            msg: String::new(),
            ping,
            duration: 0,
            down_count: 0,
            retries: 0,
            important: false,
            time,
            end_time: time + TimeDelta::seconds(len_secs),
            notified: false,
        }
    }

    fn window(start_secs: i64, end_secs: i64) -> TimeRange {
        TimeRange::new(t0() + TimeDelta::seconds(start_secs), t0() + TimeDelta::seconds(end_secs))
    }

    #[test]
    fn test_uptime_weights_by_coverage() {
        use HeartbeatStatus::*;
        let beats = vec![beat(0, 60, Up, Some(10)), beat(60, 60, Up, None), beat(120, 60, Down, None), beat(180, 60, Up, None)];
        assert_eq!(compute_uptime(&beats, window(0, 240)), Some(0.75));
    }

    #[test]
    fn test_uptime_excludes_gaps_pending_and_maintenance() {
        use HeartbeatStatus::*;
        let beats = vec![
            beat(0, 60, Up, None),
            // gap from 60 to 300
            beat(300, 60, Down, None),
            beat(360, 60, Maintenance, None),
            beat(420, 60, Pending, None),
        ];
        assert_eq!(compute_uptime(&beats, window(0, 600)), Some(0.5));
    }

    #[test]
    fn test_uptime_clips_to_window_and_next_beat() {
        use HeartbeatStatus::*;
        // Leading beat starts before the window and is cut short by the next beat
        let beats = vec![beat(-30, 120, Down, None), beat(30, 60, Up, None)];
        assert_eq!(compute_uptime(&beats, window(0, 60)), Some(0.5));
    }

    #[test]
    fn test_uptime_undefined_without_countable_time() {
        use HeartbeatStatus::*;
        assert_eq!(compute_uptime(&[], window(0, 60)), None);
        assert_eq!(compute_uptime(&[beat(0, 60, Maintenance, None)], window(0, 60)), None);
    }

    #[test]
    fn test_stepped_bucket_width() {
        let policy = SteppedBuckets::default();
        assert_eq!(policy.bucket_width(TimeDelta::minutes(90)), TimeDelta::minutes(1));
        assert_eq!(policy.bucket_width(TimeDelta::hours(24)), TimeDelta::minutes(30));
        assert_eq!(policy.bucket_width(TimeDelta::days(7)), TimeDelta::hours(3));
        assert_eq!(policy.bucket_width(TimeDelta::days(30)), TimeDelta::hours(12));
        assert_eq!(policy.bucket_width(TimeDelta::days(100)), TimeDelta::days(1));
        assert_eq!(policy.bucket_width(TimeDelta::days(365)), TimeDelta::days(4));
        assert_eq!(SteppedBuckets::new(10).bucket_width(TimeDelta::days(30)), TimeDelta::days(3));
    }

    #[test]
    fn test_long_windows_stay_under_point_cap() {
        let policy = SteppedBuckets::default();
        for days in [101, 365, 730, 3650] {
            let range = TimeRange::new(t0(), t0() + TimeDelta::days(days));
            let points = compute_points(&[], range, policy.bucket_width(TimeDelta::days(days)));
            assert!(points.len() <= 100, "{days}d window produced {} points", points.len());
            assert!(!points.is_empty());
        }
    }

    #[test]
    fn test_points_emit_every_bucket() {
        use HeartbeatStatus::*;
        let beats = vec![
            beat(0, 60, Up, Some(10)),
            beat(30, 60, Up, Some(30)),
            beat(70, 60, Down, None),
            beat(200, 60, Pending, None),
        ];
        let points = compute_points(&beats, window(0, 240), TimeDelta::minutes(1));

        assert_eq!(points.len(), 4);
        assert_eq!((points[0].up, points[0].down), (2, 0));
        assert_eq!(points[0].avg_ping, Some(20.0));
        assert_eq!((points[0].min_ping, points[0].max_ping), (Some(10), Some(30)));
        assert_eq!((points[1].up, points[1].down), (0, 1));
        assert_eq!(points[1].avg_ping, None);
        assert_eq!((points[2].up, points[2].down), (0, 0));
        assert_eq!(points[2].timestamp, t0() + TimeDelta::minutes(2));
        assert_eq!((points[3].up, points[3].down), (0, 0));
    }

    #[tokio::test]
    async fn test_aggregator_pages_through_store() {
        use HeartbeatStatus::*;
        let store = Arc::new(MemoryStore::new());
        store.append(&beat(-60, 60, Down, None)).await.unwrap();
        for i in 0..10 {
            let status = if i < 8 { Up } else { Down };
            store.append(&beat(i * 60, 60, status, Some(5))).await.unwrap();
        }

        let aggregator = UptimeAggregator::new(store).with_page_size(3);

        let uptime = aggregator.uptime(1, window(0, 600)).await.unwrap();
        assert_eq!(uptime, Some(0.8));

        let points = aggregator.stat_points(1, window(0, 600)).await.unwrap();
        assert_eq!(points.len(), 10);
        assert_eq!(points.iter().map(|p| p.up + p.down).sum::<u32>(), 10);

        let summary = aggregator.summary(1, t0() + TimeDelta::seconds(600)).await.unwrap();
        assert_eq!(summary.uptime_24h, Some(8.0 / 11.0));
        assert_eq!(summary.avg_ping_24h, Some(5.0));
    }
}
