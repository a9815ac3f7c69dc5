use serde::Deserialize;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use url::Url;

use super::{Checker, elapsed_ms, parse_config};
use crate::models::Monitor;
use crate::monitoring::types::{ConfigError, ProbeContext, ProbeFault, ProbeResult};
use crate::monitoring::validation::validate_url;

const DEFAULT_PORT: u16 = 6379;

#[derive(Debug, Deserialize)]
struct RedisConfig {
    /// `redis://[user:password@]host[:port]`
    url: String,
}

struct Target {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

/// Key-value store checker speaking RESP: optional `AUTH`, then `PING`
#[derive(Debug, Default)]
pub struct RedisChecker;

impl RedisChecker {
    pub fn new() -> Self {
        Self
    }

    fn parse(monitor: &Monitor) -> Result<Target, ConfigError> {
        let config: RedisConfig = parse_config(monitor)?;
        let url: Url = validate_url("url", &config.url, &["redis"])?;
        let host = url
            .host_str()
            .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| ConfigError::new("url", "missing host"))?;

        let username = Some(url.username()).filter(|user| !user.is_empty()).map(str::to_string);
        let password = url.password().map(str::to_string);
        if username.is_some() && password.is_none() {
            return Err(ConfigError::new("url", "a username requires a password"));
        }

        Ok(Target { host, port: url.port().unwrap_or(DEFAULT_PORT), username, password })
    }
}

/// Encode a command as a RESP array of bulk strings
fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

enum Reply {
    Simple(String),
    Error(String),
    Other(String),
}

fn parse_reply(line: &str) -> Reply {
    let line = line.trim_end_matches(['\r', '\n']);
    match line.split_at_checked(1) {
        Some(("+", rest)) => Reply::Simple(rest.to_string()),
        Some(("-", rest)) => Reply::Error(rest.to_string()),
        _ => Reply::Other(line.to_string()),
    }
}

async fn round_trip(
    reader: &mut BufReader<TcpStream>,
    args: &[&str],
) -> std::io::Result<Reply> {
    reader.get_mut().write_all(&encode_command(args)).await?;
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed by server"));
    }
    Ok(parse_reply(&line))
}

#[async_trait::async_trait]
impl Checker for RedisChecker {
    fn validate(&self, monitor: &Monitor) -> Result<(), ConfigError> {
        Self::parse(monitor).map(|_| ())
    }

    async fn check(&self, _ctx: &ProbeContext, monitor: &Monitor) -> Result<ProbeResult, ProbeFault> {
        let target = Self::parse(monitor)?;
        let start = Instant::now();

        let stream = match TcpStream::connect((target.host.as_str(), target.port)).await {
            Ok(stream) => stream,
            Err(e) => return Ok(ProbeResult::down(format!("Connection failed: {e}"))),
        };
        let mut reader = BufReader::new(stream);

        if let Some(password) = target.password.as_deref() {
            let auth = match target.username.as_deref() {
                Some(user) => round_trip(&mut reader, &["AUTH", user, password]).await,
                None => round_trip(&mut reader, &["AUTH", password]).await,
            };
            match auth {
                Ok(Reply::Simple(_)) => {}
                Ok(Reply::Error(e)) => return Ok(ProbeResult::down(format!("Authentication failed: {e}"))),
                Ok(Reply::Other(line)) => return Ok(ProbeResult::down(format!("Unexpected reply to AUTH: {line}"))),
                Err(e) => return Ok(ProbeResult::down(format!("Connection failed: {e}"))),
            }
        }

        match round_trip(&mut reader, &["PING"]).await {
            Ok(Reply::Simple(pong)) if pong == "PONG" => Ok(ProbeResult::up("PONG", Some(elapsed_ms(start)))),
            Ok(Reply::Error(e)) => Ok(ProbeResult::down(format!("Server error: {e}"))),
            Ok(Reply::Simple(line) | Reply::Other(line)) => {
                Ok(ProbeResult::down(format!("Unexpected reply to PING: {line}")))
            }
            Err(e) => Ok(ProbeResult::down(format!("Connection failed: {e}"))),
        }
    }
}
