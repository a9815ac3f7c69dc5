//! Checkers, one per monitor type.
//!
//! A checker is stateless with respect to monitors: everything it needs comes
//! from the monitor snapshot and the [`ProbeContext`]. Expected failures
//! (refused connections, bad status codes, missing keywords) are returned as
//! `Ok(ProbeResult::down(..))`; `Err` is reserved for faults.

pub mod dns;
pub mod docker;
pub mod group;
pub mod http;
#[cfg(feature = "nats")]
pub mod nats;
pub mod ping;
pub mod push;
pub mod rabbitmq;
pub mod redis;
pub mod tcp;

pub use dns::DnsChecker;
pub use docker::DockerChecker;
pub use group::GroupChecker;
pub use http::HttpChecker;
#[cfg(feature = "nats")]
pub use nats::NatsChecker;
pub use ping::PingChecker;
pub use push::PushChecker;
pub use rabbitmq::RabbitMqChecker;
pub use redis::RedisChecker;
pub use tcp::TcpChecker;

use serde::de::DeserializeOwned;
use std::time::Instant;

use super::types::{ConfigError, ProbeContext, ProbeFault, ProbeResult};
use crate::models::Monitor;

/// Checker trait for different types of monitoring checks
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Reject malformed configuration before the monitor is ever scheduled
    fn validate(&self, monitor: &Monitor) -> Result<(), ConfigError>;

    /// Perform the probe. Never re-validates; a config that fails to parse here is a fault.
    async fn check(&self, ctx: &ProbeContext, monitor: &Monitor) -> Result<ProbeResult, ProbeFault>;
}

/// Deserialize the checker-specific part of a monitor
pub(crate) fn parse_config<T: DeserializeOwned>(monitor: &Monitor) -> Result<T, ConfigError> {
    serde_json::from_value(monitor.config.clone()).map_err(|e| ConfigError::new("config", e.to_string()))
}

/// Milliseconds since `start`
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
