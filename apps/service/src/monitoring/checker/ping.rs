use serde::Deserialize;
use std::net::IpAddr;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};

use super::{Checker, parse_config};
use crate::models::Monitor;
use crate::monitoring::types::{ConfigError, ProbeContext, ProbeFault, ProbeResult};

const PAYLOAD: [u8; 56] = [0; 56];

#[derive(Debug, Deserialize)]
struct PingConfig {
    hostname: String,
}

/// ICMP echo checker; needs raw socket privileges (or `net.ipv4.ping_group_range`)
#[derive(Debug, Default)]
pub struct PingChecker;

impl PingChecker {
    pub fn new() -> Self {
        Self
    }

    fn parse(monitor: &Monitor) -> Result<PingConfig, ConfigError> {
        let config: PingConfig = parse_config(monitor)?;
        let hostname = config.hostname.trim();
        if hostname.is_empty() || hostname.contains(char::is_whitespace) || hostname.contains('/') {
            return Err(ConfigError::new("hostname", "must be a bare hostname or IP address"));
        }
        Ok(config)
    }

    async fn resolve(hostname: &str) -> Result<IpAddr, String> {
        if let Ok(ip) = hostname.parse::<IpAddr>() {
            return Ok(ip);
        }
        let mut addrs = tokio::net::lookup_host((hostname, 0))
            .await
            .map_err(|e| format!("Failed to resolve {hostname}: {e}"))?;
        addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| format!("No addresses found for {hostname}"))
    }
}

#[async_trait::async_trait]
impl Checker for PingChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), ConfigError> {
        Self::parse(monitor).map(|_| ())
    }

    async fn check(&self, ctx: &ProbeContext, monitor: &Monitor) -> Result<ProbeResult, ProbeFault> {
        let config = Self::parse(monitor)?;
        let ip = match Self::resolve(config.hostname.trim()).await {
            Ok(ip) => ip,
            Err(message) => return Ok(ProbeResult::down(message)),
        };

        let icmp_config = match ip {
            IpAddr::V4(_) => Config::default(),
            IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
        };
        let client = Client::new(&icmp_config)
            .map_err(|e| ProbeFault::Setup(format!("cannot open ICMP socket: {e}")))?;

        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(ctx.remaining());

        match pinger.ping(PingSequence(0), &PAYLOAD).await {
            Ok((_, rtt)) => Ok(ProbeResult::up(format!("Reply from {ip}"), Some(rtt.as_millis() as u64))),
            Err(SurgeError::Timeout { .. }) => Ok(ProbeResult::down(format!("Request to {ip} timed out"))),
            Err(e) => Ok(ProbeResult::down(format!("Ping failed: {e}"))),
        }
    }
}
