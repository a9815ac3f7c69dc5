use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Instant;

use super::{Checker, elapsed_ms, parse_config};
use crate::models::Monitor;
use crate::monitoring::types::{ConfigError, ProbeContext, ProbeFault, ProbeResult};
use crate::monitoring::validation::validate_url;

#[derive(Debug, Deserialize)]
struct DockerConfig {
    /// Engine API endpoint exposed over TCP, e.g. `http://localhost:2375`
    docker_host: String,
    container: String,
}

#[derive(Debug, Deserialize)]
struct ContainerInspect {
    #[serde(rename = "State")]
    state: ContainerState,
}

#[derive(Debug, Deserialize)]
struct ContainerState {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Running")]
    running: bool,
    #[serde(rename = "Health")]
    health: Option<ContainerHealth>,
}

#[derive(Debug, Deserialize)]
struct ContainerHealth {
    #[serde(rename = "Status")]
    status: String,
}

/// Container state through the Docker Engine HTTP API
pub struct DockerChecker {
    client: Client,
}

impl DockerChecker {
    pub fn new() -> reqwest::Result<Self> {
        Ok(Self { client: Client::builder().build()? })
    }

    fn parse(monitor: &Monitor) -> Result<DockerConfig, ConfigError> {
        let config: DockerConfig = parse_config(monitor)?;
        validate_url("docker_host", &config.docker_host, &["http", "https"])?;
        if config.container.trim().is_empty() || config.container.contains('/') {
            return Err(ConfigError::new("container", "must be a container name or id"));
        }
        Ok(config)
    }
}

#[async_trait::async_trait]
impl Checker for DockerChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), ConfigError> {
        Self::parse(monitor).map(|_| ())
    }

    async fn check(&self, ctx: &ProbeContext, monitor: &Monitor) -> Result<ProbeResult, ProbeFault> {
        let config = Self::parse(monitor)?;
        let url = format!("{}/containers/{}/json", config.docker_host.trim_end_matches('/'), config.container.trim());

        let start = Instant::now();
        let response = match self.client.get(&url).timeout(ctx.remaining()).send().await {
            Ok(response) => response,
            Err(e) => return Ok(ProbeResult::down(format!("Docker API unreachable: {e}"))),
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Ok(ProbeResult::down(format!("Container {} not found", config.container))),
            status => return Ok(ProbeResult::down(format!("Docker API returned {status}"))),
        }

        let inspect: ContainerInspect = match response.json().await {
            Ok(inspect) => inspect,
            Err(e) => return Ok(ProbeResult::down(format!("Unexpected Docker API response: {e}"))),
        };

        Ok(evaluate(&inspect.state, elapsed_ms(start)))
    }
}

fn evaluate(state: &ContainerState, latency: u64) -> ProbeResult {
    if !state.running {
        return ProbeResult::down(format!("Container is {}", state.status));
    }
    match state.health.as_ref().map(|health| health.status.as_str()) {
        Some("unhealthy") => ProbeResult::down("Container is unhealthy"),
        Some("starting") => ProbeResult::down("Container health check is still starting"),
        Some(health) => ProbeResult::up(format!("Container is {} ({health})", state.status), Some(latency)),
        None => ProbeResult::up(format!("Container is {}", state.status), Some(latency)),
    }
}
