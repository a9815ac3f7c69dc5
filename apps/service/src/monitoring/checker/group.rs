use serde::Deserialize;

use super::{Checker, parse_config};
use crate::models::{HeartbeatStatus, Monitor, MonitorId};
use crate::monitoring::types::{ConfigError, ProbeContext, ProbeFault, ProbeResult};

#[derive(Debug, Deserialize)]
struct GroupConfig {
    children: Vec<MonitorId>,
}

/// Composite monitor: Down as soon as any child's latest status is Down.
/// Children without a heartbeat yet do not count against the group.
#[derive(Debug, Default)]
pub struct GroupChecker;

impl GroupChecker {
    pub fn new() -> Self {
        Self
    }

    fn parse(monitor: &Monitor) -> Result<GroupConfig, ConfigError> {
        let config: GroupConfig = parse_config(monitor)?;
        if config.children.is_empty() {
            return Err(ConfigError::new("children", "a group needs at least one child"));
        }
        if config.children.contains(&monitor.id) {
            return Err(ConfigError::new("children", "a group cannot contain itself"));
        }
        Ok(config)
    }
}

#[async_trait::async_trait]
impl Checker for GroupChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), ConfigError> {
        Self::parse(monitor).map(|_| ())
    }

    async fn check(&self, ctx: &ProbeContext, monitor: &Monitor) -> Result<ProbeResult, ProbeFault> {
        let config = Self::parse(monitor)?;

        let down: Vec<String> = config
            .children
            .iter()
            .filter(|&&child| ctx.statuses.status_of(child) == Some(HeartbeatStatus::Down))
            .map(ToString::to_string)
            .collect();

        if down.is_empty() {
            Ok(ProbeResult::up("All children up", None))
        } else {
            Ok(ProbeResult::down(format!("Child monitors down: {}", down.join(", "))))
        }
    }
}
