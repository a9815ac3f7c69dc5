use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Instant;

use super::{Checker, elapsed_ms, parse_config};
use crate::models::Monitor;
use crate::monitoring::types::{ConfigError, ProbeContext, ProbeFault, ProbeResult};
use crate::monitoring::validation::validate_url;

#[derive(Debug, Deserialize)]
struct RabbitMqConfig {
    /// Management plugin base URL, e.g. `http://broker:15672`
    url: String,
    username: String,
    password: String,
    #[serde(default = "default_vhost")]
    vhost: String,
}

fn default_vhost() -> String {
    "/".to_string()
}

#[derive(Debug, Deserialize)]
struct AlivenessReply {
    status: String,
}

/// Broker round trip through the management aliveness test, which declares a
/// queue, publishes a message and consumes it on the given vhost
pub struct RabbitMqChecker {
    client: Client,
}

impl RabbitMqChecker {
    pub fn new() -> reqwest::Result<Self> {
        Ok(Self { client: Client::builder().build()? })
    }

    fn parse(monitor: &Monitor) -> Result<RabbitMqConfig, ConfigError> {
        let config: RabbitMqConfig = parse_config(monitor)?;
        validate_url("url", &config.url, &["http", "https"])?;
        if config.username.is_empty() {
            return Err(ConfigError::new("username", "must not be empty"));
        }
        if config.vhost.is_empty() {
            return Err(ConfigError::new("vhost", "must not be empty"));
        }
        Ok(config)
    }
}

/// Percent-encode a vhost for use as a single path segment
fn encode_vhost(vhost: &str) -> String {
    url::form_urlencoded::byte_serialize(vhost.as_bytes()).collect::<String>().replace('+', "%20")
}

#[async_trait::async_trait]
impl Checker for RabbitMqChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), ConfigError> {
        Self::parse(monitor).map(|_| ())
    }

    async fn check(&self, ctx: &ProbeContext, monitor: &Monitor) -> Result<ProbeResult, ProbeFault> {
        let config = Self::parse(monitor)?;
        let url = format!("{}/api/aliveness-test/{}", config.url.trim_end_matches('/'), encode_vhost(&config.vhost));

        let start = Instant::now();
        let response = match self
            .client
            .get(&url)
            .basic_auth(&config.username, Some(&config.password))
            .timeout(ctx.remaining())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(ProbeResult::down(format!("Management API unreachable: {e}"))),
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Ok(ProbeResult::down("Authentication rejected by broker")),
            StatusCode::NOT_FOUND => return Ok(ProbeResult::down(format!("Virtual host {} not found", config.vhost))),
            status => return Ok(ProbeResult::down(format!("Management API returned {status}"))),
        }

        match response.json::<AlivenessReply>().await {
            Ok(reply) if reply.status == "ok" => Ok(ProbeResult::up("Round trip OK", Some(elapsed_ms(start)))),
            Ok(reply) => Ok(ProbeResult::down(format!("Aliveness test reported `{}`", reply.status))),
            Err(e) => Ok(ProbeResult::down(format!("Unexpected management API response: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_vhost() {
        assert_eq!(encode_vhost("/"), "%2F");
        assert_eq!(encode_vhost("prod"), "prod");
        assert_eq!(encode_vhost("a b"), "a%20b");
    }

    #[test]
    fn test_validate_config() {
        let checker = RabbitMqChecker::new().unwrap();
        let ok = Monitor::new(1, "mq", "rabbitmq").with_config(json!({
            "url": "http://broker:15672", "username": "guest", "password": "guest"
        }));
        assert!(checker.validate(&ok).is_ok());
        assert_eq!(RabbitMqChecker::parse(&ok).unwrap().vhost, "/");

        let no_user = Monitor::new(1, "mq", "rabbitmq").with_config(json!({
            "url": "http://broker:15672", "username": "", "password": "x"
        }));
        assert_eq!(checker.validate(&no_user).unwrap_err().field, "username");
    }
}
