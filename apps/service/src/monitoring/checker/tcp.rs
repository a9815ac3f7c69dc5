use serde::Deserialize;
use std::time::Instant;
use tokio::net::TcpStream;

use super::{Checker, elapsed_ms, parse_config};
use crate::models::Monitor;
use crate::monitoring::types::{ConfigError, ProbeContext, ProbeFault, ProbeResult};
use crate::monitoring::validation::parse_host_port;

#[derive(Debug, Deserialize)]
struct TcpConfig {
    /// `host:port`, IPv6 hosts in brackets
    target: String,
}

/// TCP port checker
#[derive(Debug, Default)]
pub struct TcpChecker;

impl TcpChecker {
    pub fn new() -> Self {
        Self
    }

    fn parse(monitor: &Monitor) -> Result<(String, u16), ConfigError> {
        let config: TcpConfig = parse_config(monitor)?;
        parse_host_port("target", &config.target)
    }
}

#[async_trait::async_trait]
impl Checker for TcpChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), ConfigError> {
        Self::parse(monitor).map(|_| ())
    }

    async fn check(&self, _ctx: &ProbeContext, monitor: &Monitor) -> Result<ProbeResult, ProbeFault> {
        let (host, port) = Self::parse(monitor)?;
        let start = Instant::now();

        match TcpStream::connect((host.as_str(), port)).await {
            Ok(_) => Ok(ProbeResult::up(format!("Connected to {host}:{port}"), Some(elapsed_ms(start)))),
            Err(e) => Ok(ProbeResult::down(format!("TCP connection failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::NoStatuses;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn ctx() -> ProbeContext {
        ProbeContext::new(Duration::from_secs(5), Arc::new(NoStatuses))
    }

    #[test]
    fn test_validate_target() {
        let checker = TcpChecker::new();
        let ok = Monitor::new(1, "db", "tcp").with_config(json!({ "target": "localhost:5432" }));
        assert!(checker.validate(&ok).is_ok());

        let missing_port = Monitor::new(1, "db", "tcp").with_config(json!({ "target": "localhost" }));
        assert_eq!(checker.validate(&missing_port).unwrap_err().field, "target");
    }

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let monitor = Monitor::new(1, "local", "tcp").with_config(json!({ "target": format!("127.0.0.1:{port}") }));

        let result = TcpChecker::new().check(&ctx(), &monitor).await.unwrap();
        assert!(result.is_up());
        assert!(result.ping_ms.is_some());
    }

    #[tokio::test]
    async fn test_refused_connection_is_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let monitor = Monitor::new(1, "gone", "tcp").with_config(json!({ "target": format!("127.0.0.1:{port}") }));

        let result = TcpChecker::new().check(&ctx(), &monitor).await.unwrap();
        assert!(!result.is_up());
        assert!(result.message.starts_with("TCP connection failed"));
    }
}
