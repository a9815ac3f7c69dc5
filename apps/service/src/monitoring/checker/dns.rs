use serde::Deserialize;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Instant;

use super::{Checker, elapsed_ms, parse_config};
use crate::models::Monitor;
use crate::monitoring::types::{ConfigError, ProbeContext, ProbeFault, ProbeResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum RecordType {
    #[default]
    A,
    Aaaa,
    Any,
}

impl RecordType {
    fn accepts(self, ip: &IpAddr) -> bool {
        match self {
            RecordType::A => ip.is_ipv4(),
            RecordType::Aaaa => ip.is_ipv6(),
            RecordType::Any => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DnsConfig {
    hostname: String,
    #[serde(default)]
    record_type: RecordType,
    /// Every listed address must be among the answers
    #[serde(default)]
    expected: Vec<IpAddr>,
}

/// Name resolution checker using the system resolver
#[derive(Debug, Default)]
pub struct DnsChecker;

impl DnsChecker {
    pub fn new() -> Self {
        Self
    }

    fn parse(monitor: &Monitor) -> Result<DnsConfig, ConfigError> {
        let config: DnsConfig = parse_config(monitor)?;
        let hostname = config.hostname.trim();
        if hostname.is_empty() || hostname.len() > 253 || hostname.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(ConfigError::new("hostname", "must be a valid DNS name"));
        }
        if let Some(ip) = config.expected.iter().find(|ip| !config.record_type.accepts(ip)) {
            return Err(ConfigError::new("expected", format!("{ip} cannot be answered by the selected record type")));
        }
        Ok(config)
    }
}

#[async_trait::async_trait]
impl Checker for DnsChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), ConfigError> {
        Self::parse(monitor).map(|_| ())
    }

    async fn check(&self, _ctx: &ProbeContext, monitor: &Monitor) -> Result<ProbeResult, ProbeFault> {
        let config = Self::parse(monitor)?;
        let hostname = config.hostname.trim();
        let start = Instant::now();

        let answers: BTreeSet<IpAddr> = match tokio::net::lookup_host((hostname, 0)).await {
            Ok(addrs) => addrs.map(|addr| addr.ip()).filter(|ip| config.record_type.accepts(ip)).collect(),
            Err(e) => return Ok(ProbeResult::down(format!("Failed to resolve {hostname}: {e}"))),
        };
        let latency = elapsed_ms(start);

        Ok(evaluate(hostname, &answers, &config.expected, latency))
    }
}

fn evaluate(hostname: &str, answers: &BTreeSet<IpAddr>, expected: &[IpAddr], latency: u64) -> ProbeResult {
    if answers.is_empty() {
        return ProbeResult::down(format!("No matching records for {hostname}"));
    }

    let missing: Vec<String> = expected.iter().filter(|ip| !answers.contains(ip)).map(ToString::to_string).collect();
    if !missing.is_empty() {
        return ProbeResult::down(format!("Expected address missing: {}", missing.join(", ")));
    }

    let resolved: Vec<String> = answers.iter().map(ToString::to_string).collect();
    ProbeResult::up(format!("Resolved: {}", resolved.join(", ")), Some(latency))
}
