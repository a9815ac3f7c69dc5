//! Fire-and-forget fan-out of new heartbeats to live subscribers.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::models::Heartbeat;

/// Every stored heartbeat
pub const TOPIC_HEARTBEAT: &str = "heartbeat";
/// Heartbeats marking a confirmed state change
pub const TOPIC_IMPORTANT_HEARTBEAT: &str = "important-heartbeat";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Publishing never blocks and never fails from the caller's point of view;
/// an event without listeners is dropped.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, topic: &str, payload: serde_json::Value);
}

/// Publish a heartbeat on the topics it belongs to
pub fn publish_heartbeat(publisher: &dyn EventPublisher, heartbeat: &Heartbeat) {
    let payload = match serde_json::to_value(heartbeat) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(monitor_id = heartbeat.monitor_id, error = %e, "Failed to serialize heartbeat event");
            return;
        }
    };

    if heartbeat.important {
        publisher.publish(TOPIC_IMPORTANT_HEARTBEAT, payload.clone());
    }
    publisher.publish(TOPIC_HEARTBEAT, payload);
}

/// In-process event bus on a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<Event>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, topic: &str, payload: serde_json::Value) {
        debug!(topic, receivers = self.tx.receiver_count(), "Event bus: publishing");
        // Ignore errors if there are no receivers
        let _ = self.tx.send(Event { topic: topic.to_string(), payload });
    }
}

/// Publishes events to NATS subjects `{prefix}.{topic}`
#[cfg(feature = "nats")]
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
    prefix: String,
}

#[cfg(feature = "nats")]
impl NatsPublisher {
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, async_nats::ConnectError> {
        let client = async_nats::connect(url).await?;
        Ok(Self { client, prefix: prefix.into() })
    }
}

#[cfg(feature = "nats")]
impl EventPublisher for NatsPublisher {
    fn publish(&self, topic: &str, payload: serde_json::Value) {
        let client = self.client.clone();
        let subject = format!("{}.{topic}", self.prefix);
        tokio::spawn(async move {
            let bytes = match serde_json::to_vec(&payload) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(subject, error = %e, "Failed to encode event");
                    return;
                }
            };
            if let Err(e) = client.publish(subject.clone(), bytes.into()).await {
                warn!(subject, error = %e, "Failed to publish event to NATS");
            }
        });
    }
}
