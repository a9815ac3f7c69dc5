use super::Checker;
use crate::models::Monitor;
use crate::monitoring::types::{ConfigError, ProbeContext, ProbeFault, ProbeResult};

pub const NO_PUSH_MESSAGE: &str = "No heartbeat in the time window";

const MIN_TOKEN_LEN: usize = 8;
const MAX_TOKEN_LEN: usize = 64;

/// Dead-man's-switch. The scheduler only runs this when the push window
/// expired without a push, so the outcome is always Down.
#[derive(Debug, Default)]
pub struct PushChecker;

impl PushChecker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Checker for PushChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), ConfigError> {
        let token = monitor
            .push_token
            .as_deref()
            .ok_or_else(|| ConfigError::new("push_token", "push monitors need a token"))?;

        if !(MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&token.len()) {
            return Err(ConfigError::new(
                "push_token",
                format!("must be {MIN_TOKEN_LEN} to {MAX_TOKEN_LEN} characters"),
            ));
        }
        if !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(ConfigError::new("push_token", "may only contain letters, digits, `-` and `_`"));
        }
        Ok(())
    }

    async fn check(&self, _ctx: &ProbeContext, _monitor: &Monitor) -> Result<ProbeResult, ProbeFault> {
        Ok(ProbeResult::down(NO_PUSH_MESSAGE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_monitor(token: Option<&str>) -> Monitor {
        let mut monitor = Monitor::new(1, "cron", "push");
        monitor.push_token = token.map(str::to_string);
        monitor
    }

    #[test]
    fn test_validate_token() {
        let checker = PushChecker::new();
        assert!(checker.validate(&push_monitor(Some("abcDEF123_-x"))).is_ok());
        assert!(checker.validate(&push_monitor(None)).is_err());
        assert!(checker.validate(&push_monitor(Some("short"))).is_err());
        assert!(checker.validate(&push_monitor(Some("has space inside"))).is_err());
    }
}
