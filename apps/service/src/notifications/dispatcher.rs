use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{NotificationMessage, SenderError, SenderRegistry};
use crate::database::{HeartbeatStore, MonitorSource, StorageError};
use crate::models::{ChannelId, Heartbeat, HeartbeatStatus, Monitor, NotificationChannel};

/// Why a single channel did not receive a notification
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("failed to load channels: {0}")]
    Channels(#[from] StorageError),

    #[error("no provider for channel type `{0}`")]
    UnknownProvider(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Send(#[from] SenderError),
}

/// Outcome of one dispatch, for logs and tests
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<ChannelId>,
    pub failed: Vec<ChannelId>,
}

/// Fans an important heartbeat out to the monitor's channels
pub struct NotificationDispatcher {
    source: Arc<dyn MonitorSource>,
    store: Arc<dyn HeartbeatStore>,
    senders: SenderRegistry,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        source: Arc<dyn MonitorSource>,
        store: Arc<dyn HeartbeatStore>,
        senders: SenderRegistry,
        send_timeout: Duration,
    ) -> Self {
        Self { source, store, senders, send_timeout }
    }

    /// Deliver to every active bound channel, then mark the heartbeat notified.
    /// Failures are logged and reported, never returned.
    pub async fn dispatch(&self, monitor: &Monitor, heartbeat: &Heartbeat) -> DispatchReport {
        let mut report = DispatchReport::default();

        if !monitor.active || heartbeat.status == HeartbeatStatus::Maintenance {
            debug!(monitor_id = monitor.id, "Skipping notification for inactive or maintenance monitor");
            return report;
        }
        if monitor.notification_ids.is_empty() {
            return report;
        }

        let channels = match self.source.notification_channels(&monitor.notification_ids).await {
            Ok(channels) => channels,
            Err(e) => {
                let e = NotificationError::from(e);
                error!(monitor_id = monitor.id, error = %e, "Notification dispatch aborted");
                report.failed = monitor.notification_ids.clone();
                return report;
            }
        };

        let message = NotificationMessage::new(monitor, heartbeat);
        let message = &message;
        let deliveries = channels
            .iter()
            .filter(|channel| channel.active)
            .map(|channel| async move { (channel.id, self.deliver(channel, message).await) });

        for (channel_id, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(()) => report.delivered.push(channel_id),
                Err(e) => {
                    warn!(monitor_id = monitor.id, channel_id, error = %e, "Notification delivery failed");
                    report.failed.push(channel_id);
                }
            }
        }

        if let Err(e) = self.store.mark_notified(heartbeat.id).await {
            error!(monitor_id = monitor.id, heartbeat_id = %heartbeat.id, error = %e, "Failed to mark heartbeat notified");
        }

        info!(
            monitor_id = monitor.id,
            status = %heartbeat.status,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Notification dispatched"
        );
        report
    }

    async fn deliver(&self, channel: &NotificationChannel, message: &NotificationMessage) -> Result<(), NotificationError> {
        let provider = self
            .senders
            .get(&channel.channel_type)
            .ok_or_else(|| NotificationError::UnknownProvider(channel.channel_type.clone()))?;

        tokio::time::timeout(self.send_timeout, provider.send(channel, message))
            .await
            .map_err(|_| NotificationError::Timeout(self.send_timeout))??;
        Ok(())
    }
}
