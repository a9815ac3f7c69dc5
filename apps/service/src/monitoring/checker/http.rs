use reqwest::{Client, Method, StatusCode, header};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Instant;

use super::{Checker, elapsed_ms, parse_config};
use crate::models::Monitor;
use crate::monitoring::types::{ConfigError, ProbeContext, ProbeFault, ProbeResult};
use crate::monitoring::validation::validate_url;

#[derive(Debug, Deserialize)]
struct HttpConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<String>,
    /// Entries like `"200-299"` or `"404"`
    #[serde(default = "default_accepted_status_codes")]
    accepted_status_codes: Vec<String>,
    #[serde(default)]
    ignore_tls: bool,
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    invert_keyword: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_accepted_status_codes() -> Vec<String> {
    vec!["200-299".to_string()]
}

/// Inclusive range of accepted status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StatusRange {
    start: u16,
    end: u16,
}

impl StatusRange {
    fn parse(raw: &str) -> Option<Self> {
        let (start, end) = match raw.trim().split_once('-') {
            Some((start, end)) => (start.trim().parse().ok()?, end.trim().parse().ok()?),
            None => {
                let code = raw.trim().parse().ok()?;
                (code, code)
            }
        };
        if !(100..=599).contains(&start) || !(100..=599).contains(&end) || start > end {
            return None;
        }
        Some(Self { start, end })
    }

    fn contains(&self, status: StatusCode) -> bool {
        (self.start..=self.end).contains(&status.as_u16())
    }
}

/// HTTP/HTTPS checker, optionally matching a keyword in the body
pub struct HttpChecker {
    client: Client,
    insecure_client: Client,
    keyword_mode: bool,
}

impl HttpChecker {
    /// Plain status-code checker (`http` type)
    pub fn new() -> reqwest::Result<Self> {
        Self::build(false)
    }

    /// Checker that also requires a keyword in the response body (`keyword` type)
    pub fn keyword() -> reqwest::Result<Self> {
        Self::build(true)
    }

    fn build(keyword_mode: bool) -> reqwest::Result<Self> {
        let user_agent = concat!("Uppe/", env!("CARGO_PKG_VERSION"));
        let client = Client::builder().user_agent(user_agent).build()?;
        let insecure_client =
            Client::builder().user_agent(user_agent).danger_accept_invalid_certs(true).build()?;

        Ok(Self { client, insecure_client, keyword_mode })
    }

    fn parse(&self, monitor: &Monitor) -> Result<(HttpConfig, Method, Vec<StatusRange>), ConfigError> {
        let config: HttpConfig = parse_config(monitor)?;
        validate_url("url", &config.url, &["http", "https"])?;

        let method = Method::from_bytes(config.method.to_uppercase().as_bytes())
            .map_err(|_| ConfigError::new("method", format!("unsupported HTTP method `{}`", config.method)))?;

        for (name, value) in &config.headers {
            header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConfigError::new("headers", format!("invalid header name `{name}`: {e}")))?;
            header::HeaderValue::from_str(value)
                .map_err(|e| ConfigError::new("headers", format!("invalid value for `{name}`: {e}")))?;
        }

        if config.accepted_status_codes.is_empty() {
            return Err(ConfigError::new("accepted_status_codes", "at least one range is required"));
        }
        let ranges = config
            .accepted_status_codes
            .iter()
            .map(|raw| {
                StatusRange::parse(raw)
                    .ok_or_else(|| ConfigError::new("accepted_status_codes", format!("invalid entry `{raw}`")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if self.keyword_mode && config.keyword.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::new("keyword", "required for keyword monitors"));
        }

        Ok((config, method, ranges))
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), ConfigError> {
        self.parse(monitor).map(|_| ())
    }

    async fn check(&self, ctx: &ProbeContext, monitor: &Monitor) -> Result<ProbeResult, ProbeFault> {
        let (config, method, ranges) = self.parse(monitor)?;
        let client = if config.ignore_tls { &self.insecure_client } else { &self.client };

        let mut request = client.request(method, &config.url).timeout(ctx.remaining());
        for (name, value) in &config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = config.body {
            request = request.body(body);
        }

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Ok(ProbeResult::down("Request timed out")),
            Err(e) => return Ok(ProbeResult::down(format!("HTTP request failed: {e}"))),
        };
        let status = response.status();

        if !ranges.iter().any(|range| range.contains(status)) {
            return Ok(ProbeResult::down(format!(
                "Status code {} does not match accepted codes {}",
                status.as_u16(),
                config.accepted_status_codes.join(", ")
            )));
        }

        let Some(keyword) = config.keyword.filter(|_| self.keyword_mode) else {
            let latency = elapsed_ms(start);
            return Ok(ProbeResult::up(status_line(status), Some(latency)));
        };

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Ok(ProbeResult::down(format!("Failed to read response body: {e}"))),
        };
        let latency = elapsed_ms(start);

        Ok(keyword_outcome(&body, &keyword, config.invert_keyword, status, latency))
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} - {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

fn keyword_outcome(body: &str, keyword: &str, invert: bool, status: StatusCode, latency: u64) -> ProbeResult {
    let found = body.contains(keyword);
    if found != invert {
        let verb = if found { "found" } else { "not found" };
        ProbeResult::up(format!("{}, keyword `{keyword}` {verb}", status_line(status)), Some(latency))
    } else {
        let mut excerpt: String = body.chars().take(50).collect();
        if body.chars().count() > 50 {
            excerpt.push_str("...");
        }
        let verb = if found { "found" } else { "not found" };
        ProbeResult::down(format!("Keyword `{keyword}` {verb} in [{excerpt}]"))
    }
}
