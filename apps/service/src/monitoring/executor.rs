use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::timeout_at;
use tracing::{error, warn};

use super::checker::{
    Checker, DnsChecker, DockerChecker, GroupChecker, HttpChecker, PingChecker, PushChecker, RabbitMqChecker,
    RedisChecker, TcpChecker,
};
use super::types::{ConfigError, ProbeContext, ProbeFault, ProbeResult};
use super::validation::validate_schedule;
use crate::models::Monitor;

/// Message surfaced to users when a checker faults or panics
pub const INTERNAL_PROBE_ERROR: &str = "Internal probe error";

/// Monitoring executor - maps monitor types to checkers and runs probes
/// under a hard deadline
#[derive(Clone, Default)]
pub struct MonitoringExecutor {
    checkers: HashMap<String, Arc<dyn Checker>>,
}

impl MonitoringExecutor {
    /// Create an executor with every built-in checker registered
    pub fn new() -> anyhow::Result<Self> {
        let executor = Self::default()
            .with_checker("http", HttpChecker::new()?)
            .with_checker("keyword", HttpChecker::keyword()?)
            .with_checker("tcp", TcpChecker::new())
            .with_checker("ping", PingChecker::new())
            .with_checker("dns", DnsChecker::new())
            .with_checker("docker", DockerChecker::new()?)
            .with_checker("redis", RedisChecker::new())
            .with_checker("rabbitmq", RabbitMqChecker::new()?)
            .with_checker("group", GroupChecker::new())
            .with_checker("push", PushChecker::new());

        #[cfg(feature = "nats")]
        let executor = executor.with_checker("nats", super::checker::NatsChecker::new());

        Ok(executor)
    }

    /// Register (or replace) the checker for a monitor type
    pub fn with_checker(mut self, monitor_type: impl Into<String>, checker: impl Checker + 'static) -> Self {
        self.checkers.insert(monitor_type.into(), Arc::new(checker));
        self
    }

    pub fn supports(&self, monitor_type: &str) -> bool {
        self.checkers.contains_key(monitor_type)
    }

    /// Registered monitor types, sorted
    pub fn monitor_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.checkers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Validate the schedule fields and the type-specific configuration
    pub fn validate(&self, monitor: &Monitor) -> Result<(), ConfigError> {
        validate_schedule(monitor)?;
        self.checker_for(monitor)?.validate(monitor)
    }

    fn checker_for(&self, monitor: &Monitor) -> Result<&Arc<dyn Checker>, ConfigError> {
        self.checkers.get(&monitor.monitor_type).ok_or_else(|| {
            ConfigError::new("monitor_type", format!("unknown monitor type `{}`", monitor.monitor_type))
        })
    }

    /// Execute a probe. Never fails: timeouts, faults and panics all become Down results.
    pub async fn execute(&self, ctx: &ProbeContext, monitor: &Monitor) -> ProbeResult {
        let checker = match self.checker_for(monitor) {
            Ok(checker) => checker,
            Err(e) => {
                error!(monitor_id = monitor.id, error = %e, "Monitor reached the executor without a checker");
                return ProbeResult::down(INTERNAL_PROBE_ERROR);
            }
        };

        let probe = AssertUnwindSafe(checker.check(ctx, monitor)).catch_unwind();

        match timeout_at(ctx.deadline, probe).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(fault))) => {
                error!(monitor_id = monitor.id, monitor_type = %monitor.monitor_type, error = %fault, "Probe fault");
                ProbeResult::down(INTERNAL_PROBE_ERROR)
            }
            Ok(Err(payload)) => {
                let fault = ProbeFault::Panicked(panic_message(payload.as_ref()));
                error!(monitor_id = monitor.id, monitor_type = %monitor.monitor_type, error = %fault, "Probe panicked");
                ProbeResult::down(INTERNAL_PROBE_ERROR)
            }
            Err(_) => {
                warn!(monitor_id = monitor.id, timeout = ?ctx.timeout, "Probe timed out");
                ProbeResult::down(format!("Timeout after {}s", ctx.timeout.as_secs()))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
