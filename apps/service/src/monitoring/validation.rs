//! Schedule and target validation shared by the checkers.
//!
//! Everything here runs before a monitor is scheduled, so the scheduler and
//! the checkers can assume well-formed input.

use url::Url;

use super::types::ConfigError;
use crate::models::Monitor;

const MIN_INTERVAL: u64 = 1;
const MAX_INTERVAL: u64 = 86400; // 24 hours
const MIN_TIMEOUT: u64 = 1;
const MAX_TIMEOUT: u64 = 300; // 5 minutes

/// Validate the fields every monitor type shares
pub fn validate_schedule(monitor: &Monitor) -> Result<(), ConfigError> {
    validate_check_interval("interval_seconds", monitor.interval_seconds)?;
    validate_check_interval("retry_interval_seconds", monitor.retry_interval_seconds)?;
    validate_timeout(monitor.timeout_seconds, monitor.interval_seconds)?;

    if monitor.name.trim().is_empty() {
        return Err(ConfigError::new("name", "must not be empty"));
    }

    Ok(())
}

/// Validate check interval bounds
pub fn validate_check_interval(field: &str, interval_seconds: u64) -> Result<(), ConfigError> {
    if interval_seconds < MIN_INTERVAL {
        return Err(ConfigError::new(
            field,
            format!("too short: {interval_seconds} seconds (minimum: {MIN_INTERVAL})"),
        ));
    }

    if interval_seconds > MAX_INTERVAL {
        return Err(ConfigError::new(
            field,
            format!("too long: {interval_seconds} seconds (maximum: {MAX_INTERVAL})"),
        ));
    }

    Ok(())
}

/// Validate timeout is reasonable and fits inside one interval
pub fn validate_timeout(timeout_seconds: u64, interval_seconds: u64) -> Result<(), ConfigError> {
    if timeout_seconds < MIN_TIMEOUT {
        return Err(ConfigError::new(
            "timeout_seconds",
            format!("too short: {timeout_seconds} seconds (minimum: {MIN_TIMEOUT})"),
        ));
    }

    if timeout_seconds > MAX_TIMEOUT {
        return Err(ConfigError::new(
            "timeout_seconds",
            format!("too long: {timeout_seconds} seconds (maximum: {MAX_TIMEOUT})"),
        ));
    }

    if timeout_seconds > interval_seconds {
        return Err(ConfigError::new(
            "timeout_seconds",
            format!("{timeout_seconds} seconds exceeds the {interval_seconds} second interval"),
        ));
    }

    Ok(())
}

/// Parse a URL and check its scheme against an allow list
pub fn validate_url(field: &str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::new(field, format!("invalid URL: {e}")))?;

    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::new(
            field,
            format!("unsupported scheme `{}` (expected one of: {})", url.scheme(), schemes.join(", ")),
        ));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::new(field, "URL has no host"));
    }

    if let Some(port) = url.port() {
        validate_port(field, port)?;
    }

    Ok(url)
}

/// Split a `host:port` target; IPv6 hosts must be bracketed (`[::1]:80`)
pub fn parse_host_port(field: &str, target: &str) -> Result<(String, u16), ConfigError> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::new(field, "target must be in format host:port"))?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(ConfigError::new(field, "host must not be empty"));
    }
    if host.contains(':') && !target.starts_with('[') {
        return Err(ConfigError::new(field, "IPv6 hosts must be written as [addr]:port"));
    }

    let port: u16 = port
        .parse()
        .map_err(|_| ConfigError::new(field, format!("invalid port number `{port}`")))?;
    validate_port(field, port)?;

    Ok((host.to_string(), port))
}

/// Validate port is in valid range
pub fn validate_port(field: &str, port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::new(field, "port 0 is not valid"));
    }
    Ok(())
}
