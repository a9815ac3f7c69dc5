use futures::StreamExt;
use serde::Deserialize;
use std::time::Instant;

use super::{Checker, elapsed_ms, parse_config};
use crate::models::Monitor;
use crate::monitoring::types::{ConfigError, ProbeContext, ProbeFault, ProbeResult};
use crate::monitoring::validation::validate_url;

#[derive(Debug, Deserialize)]
struct NatsConfig {
    url: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

/// Publishes to a private inbox and waits for the message to come back
#[derive(Debug, Default)]
pub struct NatsChecker;

impl NatsChecker {
    pub fn new() -> Self {
        Self
    }

    fn parse(monitor: &Monitor) -> Result<NatsConfig, ConfigError> {
        let config: NatsConfig = parse_config(monitor)?;
        validate_url("url", &config.url, &["nats", "tls"])?;
        if config.username.is_some() != config.password.is_some() {
            return Err(ConfigError::new("username", "username and password must be set together"));
        }
        if config.token.is_some() && config.username.is_some() {
            return Err(ConfigError::new("token", "cannot be combined with username/password"));
        }
        Ok(config)
    }
}

#[async_trait::async_trait]
impl Checker for NatsChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), ConfigError> {
        Self::parse(monitor).map(|_| ())
    }

    async fn check(&self, ctx: &ProbeContext, monitor: &Monitor) -> Result<ProbeResult, ProbeFault> {
        let config = Self::parse(monitor)?;

        let mut options = async_nats::ConnectOptions::new().connection_timeout(ctx.remaining());
        if let (Some(user), Some(pass)) = (config.username, config.password) {
            options = options.user_and_password(user, pass);
        }
        if let Some(token) = config.token {
            options = options.token(token);
        }

        let start = Instant::now();
        let client = match options.connect(config.url.as_str()).await {
            Ok(client) => client,
            Err(e) => return Ok(ProbeResult::down(format!("Connection failed: {e}"))),
        };

        let inbox = client.new_inbox();
        let mut subscriber = match client.subscribe(inbox.clone()).await {
            Ok(subscriber) => subscriber,
            Err(e) => return Ok(ProbeResult::down(format!("Subscribe failed: {e}"))),
        };
        if let Err(e) = client.publish(inbox, "uppe-probe".into()).await {
            return Ok(ProbeResult::down(format!("Publish failed: {e}")));
        }
        if let Err(e) = client.flush().await {
            return Ok(ProbeResult::down(format!("Flush failed: {e}")));
        }

        match subscriber.next().await {
            Some(_) => Ok(ProbeResult::up("Round trip OK", Some(elapsed_ms(start)))),
            None => Ok(ProbeResult::down("Subscription closed before the message arrived")),
        }
    }
}
