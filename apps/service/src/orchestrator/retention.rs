//! Automatic retention of heartbeats.
//!
//! Heartbeats older than the configured number of days are pruned. Cleanup
//! runs periodically (every hour by default) as a background task.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config;
use crate::database::{HeartbeatStore, StorageError};

/// How long heartbeats are kept
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Days to keep heartbeats, 0 keeps them forever
    pub heartbeat_days: u32,
    pub interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { heartbeat_days: 180, interval: Duration::from_secs(3600) }
    }
}

impl From<&config::Retention> for RetentionPolicy {
    fn from(retention: &config::Retention) -> Self {
        Self { heartbeat_days: retention.heartbeat_days, interval: retention.prune_interval() }
    }
}

impl RetentionPolicy {
    /// Oldest heartbeat time still kept at `now`
    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.heartbeat_days > 0).then(|| now - TimeDelta::days(i64::from(self.heartbeat_days)))
    }
}

/// Cleanup manager for expired heartbeats
pub struct RetentionCleanup {
    store: Arc<dyn HeartbeatStore>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(store: Arc<dyn HeartbeatStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Prune heartbeats that fell out of the window, returning how many went
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let Some(cutoff) = self.policy.cutoff(now) else {
            debug!("Retention disabled, keeping all heartbeats");
            return Ok(0);
        };

        let pruned = self.store.prune_before(cutoff).await?;
        info!(pruned, %cutoff, "Retention cleanup completed");
        Ok(pruned)
    }

    /// Start background cleanup task
    pub fn start_periodic_cleanup(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.policy.interval);

            loop {
                interval.tick().await;

                if let Err(e) = self.cleanup_expired(Utc::now()).await {
                    warn!(error = %e, "Periodic retention cleanup failed");
                }
            }
        })
    }
}
