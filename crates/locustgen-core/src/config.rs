//! Configuration for the locustgen server.
//!
//! Sources, highest precedence first:
//! 1. Environment variables (`LOCUSTGEN_*`)
//! 2. TOML configuration file
//! 3. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LocustgenError;

/// File picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "locustgen.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Per-connection limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,

    /// Idle time after which a connection is probed.
    #[serde(default = "default_soft_timeout")]
    pub soft_timeout_secs: u64,

    /// Idle time after which a connection is closed.
    #[serde(default = "default_hard_timeout")]
    pub hard_timeout_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Name or path of the Locust executable.
    #[serde(default = "default_executable")]
    pub executable: String,

    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_root")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8124
}

fn default_max_requests_per_minute() -> u32 {
    60
}

fn default_soft_timeout() -> u64 {
    30
}

fn default_hard_timeout() -> u64 {
    90
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_executable() -> String {
    "locust".to_string()
}

fn default_max_concurrent_runs() -> usize {
    4
}

fn default_archive_root() -> PathBuf {
    PathBuf::from("tests/generated")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: default_max_requests_per_minute(),
            soft_timeout_secs: default_soft_timeout(),
            hard_timeout_secs: default_hard_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl SessionConfig {
    pub fn soft_timeout(&self) -> Duration {
        Duration::from_secs(self.soft_timeout_secs)
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_secs(self.hard_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: default_archive_root(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LocustgenError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LocustgenError::Config(format!("cannot read {}: {e}", path.display()))
        })?;

        toml::from_str(&contents)
            .map_err(|e| LocustgenError::Config(format!("invalid TOML in {}: {e}", path.display())))
    }

    /// Load `path` if given, else `locustgen.toml` when present, else the
    /// defaults; then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, LocustgenError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();

        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `LOCUSTGEN_*` overrides looked up through `lookup`. Values that
    /// do not parse are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("LOCUSTGEN_HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("LOCUSTGEN_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }

        if let Some(limit) =
            lookup("LOCUSTGEN_MAX_REQUESTS_PER_MINUTE").and_then(|v| v.parse().ok())
        {
            self.session.max_requests_per_minute = limit;
        }

        if let Some(secs) = lookup("LOCUSTGEN_SOFT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.session.soft_timeout_secs = secs;
        }

        if let Some(secs) = lookup("LOCUSTGEN_HARD_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.session.hard_timeout_secs = secs;
        }

        if let Some(secs) = lookup("LOCUSTGEN_SWEEP_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.session.sweep_interval_secs = secs;
        }

        if let Some(executable) = lookup("LOCUSTGEN_LOCUST_EXECUTABLE") {
            self.runner.executable = executable;
        }

        if let Some(max) = lookup("LOCUSTGEN_MAX_CONCURRENT_RUNS").and_then(|v| v.parse().ok()) {
            self.runner.max_concurrent_runs = max;
        }

        if let Some(root) = lookup("LOCUSTGEN_ARCHIVE_ROOT") {
            self.archive.root = PathBuf::from(root);
        }

        if let Some(level) = lookup("LOCUSTGEN_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("LOCUSTGEN_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    pub fn validate(&self) -> Result<(), LocustgenError> {
        if self.server.port == 0 {
            return Err(LocustgenError::Config("server.port must be non-zero".to_string()));
        }

        if self.session.max_requests_per_minute == 0 {
            return Err(LocustgenError::Config(
                "session.max_requests_per_minute must be at least 1".to_string(),
            ));
        }

        if self.session.soft_timeout_secs >= self.session.hard_timeout_secs {
            return Err(LocustgenError::Config(format!(
                "session.soft_timeout_secs ({}) must be below session.hard_timeout_secs ({})",
                self.session.soft_timeout_secs, self.session.hard_timeout_secs
            )));
        }

        if self.session.sweep_interval_secs == 0 {
            return Err(LocustgenError::Config(
                "session.sweep_interval_secs must be non-zero".to_string(),
            ));
        }

        if self.runner.executable.trim().is_empty() {
            return Err(LocustgenError::Config(
                "runner.executable cannot be empty".to_string(),
            ));
        }

        if self.runner.max_concurrent_runs == 0 {
            return Err(LocustgenError::Config(
                "runner.max_concurrent_runs must be at least 1".to_string(),
            ));
        }

        if self.archive.root.as_os_str().is_empty() {
            return Err(LocustgenError::Config("archive.root cannot be empty".to_string()));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(LocustgenError::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.server.port, 8124);
        assert_eq!(config.session.max_requests_per_minute, 60);
        assert_eq!(config.runner.executable, "locust");
        assert_eq!(config.archive.root, PathBuf::from("tests/generated"));
        config.validate().expect("defaults should validate");
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [session]
            max_requests_per_minute = 5
            "#,
        )
        .expect("toml should parse");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.session.max_requests_per_minute, 5);
        assert_eq!(config.session.hard_timeout_secs, 90);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("locustgen.toml");
        std::fs::write(&path, "[runner]\nexecutable = \"/opt/locust/bin/locust\"\n")
            .expect("write");
        let config = Config::load(Some(path.as_path())).expect("load should succeed");
        assert_eq!(config.runner.executable, "/opt/locust/bin/locust");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/locustgen.toml"))).unwrap_err();
        assert!(matches!(err, LocustgenError::Config(_)));
    }

    #[test]
    fn overrides_replace_values_and_skip_garbage() {
        let vars: HashMap<&str, &str> = [
            ("LOCUSTGEN_PORT", "9999"),
            ("LOCUSTGEN_MAX_CONCURRENT_RUNS", "not-a-number"),
            ("LOCUSTGEN_LOG_FORMAT", "json"),
            ("LOCUSTGEN_ARCHIVE_ROOT", "/var/lib/locustgen"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.runner.max_concurrent_runs, 4);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.archive.root, PathBuf::from("/var/lib/locustgen"));
    }

    #[test]
    fn validate_rejects_soft_timeout_not_below_hard() {
        let mut config = Config::default();
        config.session.soft_timeout_secs = 90;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("soft_timeout_secs"));
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.session.max_requests_per_minute = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.runner.max_concurrent_runs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
