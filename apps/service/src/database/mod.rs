/// Storage layer
///
/// The engine talks to storage through two traits: [`MonitorSource`] for the
/// externally owned monitor definitions and [`HeartbeatStore`] for the
/// append-only heartbeat stream. Both are implemented by the libsql
/// repository and by an in-memory store.
pub mod memory;
pub mod migrations;
pub mod repository;

pub use memory::MemoryStore;
pub use repository::LibsqlRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ChannelId, Heartbeat, MaintenanceWindow, Monitor, MonitorId, NotificationChannel};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<deadpool::managed::PoolError<libsql::Error>> for StorageError {
    fn from(e: deadpool::managed::PoolError<libsql::Error>) -> Self {
        StorageError::Pool(e.to_string())
    }
}

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Offset pagination over time-ordered results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    pub fn next(self) -> Self {
        Self { offset: self.offset + self.limit, ..self }
    }
}

/// Heartbeat persistence
#[async_trait]
pub trait HeartbeatStore: Send + Sync {
    /// Store a heartbeat, capping the `end_time` of earlier heartbeats of the
    /// same monitor at its `time` so stored intervals never overlap
    async fn append(&self, heartbeat: &Heartbeat) -> Result<(), StorageError>;

    /// Heartbeats with `time` inside `range`, oldest first
    async fn query(&self, monitor_id: MonitorId, range: TimeRange, page: Page) -> Result<Vec<Heartbeat>, StorageError>;

    /// Newest heartbeat with `time` strictly before `at`
    async fn latest_before(&self, monitor_id: MonitorId, at: DateTime<Utc>) -> Result<Option<Heartbeat>, StorageError>;

    async fn latest(&self, monitor_id: MonitorId) -> Result<Option<Heartbeat>, StorageError>;

    async fn latest_important(&self, monitor_id: MonitorId) -> Result<Option<Heartbeat>, StorageError>;

    async fn mark_notified(&self, heartbeat_id: Uuid) -> Result<(), StorageError>;

    /// Delete heartbeats older than `cutoff`, returning how many were removed
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// Read access to externally owned monitor definitions
#[async_trait]
pub trait MonitorSource: Send + Sync {
    async fn active_monitors(&self) -> Result<Vec<Monitor>, StorageError>;

    async fn monitor(&self, monitor_id: MonitorId) -> Result<Option<Monitor>, StorageError>;

    async fn notification_channels(&self, ids: &[ChannelId]) -> Result<Vec<NotificationChannel>, StorageError>;

    async fn maintenance_windows(&self) -> Result<Vec<MaintenanceWindow>, StorageError>;
}

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> anyhow::Result<()> {
    migrations::run_migrations(conn).await
}
