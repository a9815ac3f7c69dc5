use std::env::var;
use std::str::FromStr;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

pub fn init_tracing() {
    init_tracing_with(LevelFilter::INFO, None);
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` overrides `level` and `RUST_LOG_FORMAT` overrides `format`.
/// Calling this twice is harmless; the second call leaves the first subscriber
/// in place.
pub fn init_tracing_with(level: LevelFilter, format: Option<LogFormat>) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let env_format = var("RUST_LOG_FORMAT").ok().map(|raw| raw.parse::<LogFormat>());
    let (log_format, rejected) = match env_format {
        Some(Ok(parsed)) => (parsed, None),
        Some(Err(error)) => (format.unwrap_or_default(), Some(error)),
        None => (format.unwrap_or_default(), None),
    };

    let log_layer = match log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        return;
    }

    if let Some(error) = rejected {
        warn!("Ignoring RUST_LOG_FORMAT, falling back to configured format: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_format() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert_eq!("".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("pretty-ish".parse::<LogFormat>().is_err());
    }
}
