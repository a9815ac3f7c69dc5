use std::time::Duration;
use std::{env, fmt, fs, io, path};

use logger::LogFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: Scheduler,
    pub database: Database,
    pub notifications: Notifications,
    pub retention: Retention,
    pub uptime: Uptime,
    pub logging: Logging,
    pub server: Server,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scheduler {
    /// Probes allowed in flight at once across all monitors
    pub max_concurrent_probes: usize,
    pub push_grace_seconds: u64,
    /// How often monitors are reconciled against the monitor source
    pub reload_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub path: path::PathBuf,
    pub pool_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notifications {
    pub send_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Retention {
    /// Heartbeats older than this are pruned, 0 keeps everything
    pub heartbeat_days: u32,
    pub prune_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Uptime {
    pub max_chart_points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    /// `compact` or `json`
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self { max_concurrent_probes: 256, push_grace_seconds: 5, reload_interval_seconds: 30 }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self { path: path::PathBuf::from("uppe.db"), pool_size: 8 }
    }
}

impl Default for Notifications {
    fn default() -> Self {
        Self { send_timeout_seconds: 10 }
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self { heartbeat_days: 180, prune_interval_seconds: 3600 }
    }
}

impl Default for Uptime {
    fn default() -> Self {
        Self { max_chart_points: 100 }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl Scheduler {
    pub fn push_grace(&self) -> Duration {
        Duration::from_secs(self.push_grace_seconds)
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_seconds.max(1))
    }
}

impl Notifications {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds)
    }
}

impl Logging {
    /// Install the global tracing subscriber; `RUST_LOG` and `RUST_LOG_FORMAT` still win
    pub fn init(&self) {
        let level = self.level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
        logger::init_tracing_with(level, self.format.parse::<LogFormat>().ok());
    }
}

impl Retention {
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_seconds.max(1))
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/uppe/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("uppe/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Max Concurrent Probes", &self.scheduler.max_concurrent_probes)?;
        write_1(f, "Push Grace (s)", &self.scheduler.push_grace_seconds)?;
        write_1(f, "Reload Interval (s)", &self.scheduler.reload_interval_seconds)?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Pool Size", &self.database.pool_size)?;
        write_title_1(f, "Notifications")?;
        write_1(f, "Send Timeout (s)", &self.notifications.send_timeout_seconds)?;
        write_title_1(f, "Retention")?;
        write_1(f, "Heartbeat Days", &self.retention.heartbeat_days)?;
        write_1(f, "Prune Interval (s)", &self.retention.prune_interval_seconds)?;
        write_title_1(f, "Uptime")?;
        write_1(f, "Max Chart Points", &self.uptime.max_chart_points)?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uppe/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// let cfg = uppe_service::config::Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), uppe_service::config::Error>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;
        let write_failed = |source| Error::WriteFailed { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        fs::write(path, config_str).map_err(write_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("nested/config.toml").exists());

        let reread = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reread, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler]\nmax_concurrent_probes = 4\n\n[retention]\nheartbeat_days = 7\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.scheduler.max_concurrent_probes, 4);
        assert_eq!(config.scheduler.push_grace_seconds, 5);
        assert_eq!(config.retention.heartbeat_days, 7);
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler\n").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(Error::ParseFailed(_))));
    }

    #[test]
    fn test_display_lists_sections() {
        let rendered = Config::default().to_string();
        assert!(rendered.contains("Scheduler"));
        assert!(rendered.contains("Bind Address: 0.0.0.0:8080"));
    }
}
