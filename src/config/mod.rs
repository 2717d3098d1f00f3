//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup. Sources are parsed first, command-line overrides
//! applied on top, and only the merged result is validated. The engine
//! re-validates whatever it is handed, since settings can be swapped while
//! it runs.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Shortest permitted firing interval, in seconds.
pub const MIN_INTERVAL_SECS: u32 = 1;
/// Longest permitted firing interval, in seconds.
pub const MAX_INTERVAL_SECS: u32 = 3600;
/// Longest permitted destination path, in bytes.
pub const MAX_PATH_LEN: usize = 4095;

const DEFAULT_DESTINATION: &str = "/var/tmp/ticklog/ticklog.log";
const DEFAULT_INTERVAL_SECS: u32 = 5;
const DEFAULT_MESSAGE: &str = "Hello from ticklog";
const DEFAULT_WORKERS: usize = 1;

/// Settings consumed by [`Engine::start`](crate::engine::Engine::start).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// File every produced line is appended to.
    pub destination: PathBuf,
    /// Seconds between firings, in `[MIN_INTERVAL_SECS, MAX_INTERVAL_SECS]`.
    pub interval_secs: u32,
    /// Template text; each line is `"<message> (<sequence>)\n"`.
    pub message: String,
    /// Worker count. Only a single worker preserves sequence order in the log.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::from(DEFAULT_DESTINATION),
            interval_secs: DEFAULT_INTERVAL_SECS,
            message: DEFAULT_MESSAGE.to_string(),
            workers: DEFAULT_WORKERS,
        }
    }
}

impl EngineConfig {
    pub fn new(destination: impl Into<PathBuf>, interval_secs: u32) -> Self {
        Self {
            destination: destination.into(),
            interval_secs,
            ..Self::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Check every field, returning the first violation.
    pub fn validate(&self) -> Result<()> {
        validate_destination(&self.destination)?;
        validate_interval(self.interval_secs)?;
        if self.message.is_empty() {
            return Err(Error::Config("message must not be empty".to_string()));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Reject empty or over-long destinations.
pub fn validate_destination(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len == 0 {
        return Err(Error::Config("destination must not be empty".to_string()));
    }
    if len > MAX_PATH_LEN {
        return Err(Error::Config(format!(
            "destination is {len} bytes, limit is {MAX_PATH_LEN}"
        )));
    }
    Ok(())
}

/// Reject intervals outside `[MIN_INTERVAL_SECS, MAX_INTERVAL_SECS]`.
pub fn validate_interval(secs: u32) -> Result<()> {
    if (MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "interval must be between {MIN_INTERVAL_SECS} and {MAX_INTERVAL_SECS} seconds, got {secs}"
        )))
    }
}

/// Process-level configuration: engine settings plus telemetry knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub otel_endpoint: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values that take precedence over the environment or config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub destination: Option<PathBuf>,
    pub interval_secs: Option<u32>,
    pub workers: Option<usize>,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let config = Self::read_env()?;
        if config.engine.destination.as_os_str().is_empty() {
            required_var("TICKLOG_DESTINATION")?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse environment variables without validating them.
    ///
    /// An unset `TICKLOG_DESTINATION` leaves the destination empty for an
    /// override to fill in. Unparseable values are still errors.
    pub fn read_env() -> Result<Self> {
        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            destination: std::env::var_os("TICKLOG_DESTINATION")
                .map(PathBuf::from)
                .unwrap_or_default(),
            interval_secs: parsed_var("TICKLOG_INTERVAL_SECS")?.unwrap_or(defaults.interval_secs),
            message: std::env::var("TICKLOG_MESSAGE").unwrap_or(defaults.message),
            workers: parsed_var("TICKLOG_WORKERS")?.unwrap_or(defaults.workers),
        };

        Ok(Self {
            engine,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config = Self::parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without validating it.
    pub fn parse_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file without validating it.
    pub fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::parse_toml(&content)
    }

    /// Read `file` (or the environment when `None`), apply `overrides`, then
    /// validate the result once.
    pub fn resolve(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::read_file(path)?,
            None => Self::read_env()?,
        };
        config.apply(overrides);
        if config.engine.destination.as_os_str().is_empty() {
            return Err(Error::Config(
                "no destination: set TICKLOG_DESTINATION or pass --destination".to_string(),
            ));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref destination) = overrides.destination {
            self.engine.destination = destination.clone();
        }
        if let Some(interval_secs) = overrides.interval_secs {
            self.engine.interval_secs = interval_secs;
        }
        if let Some(workers) = overrides.workers {
            self.engine.workers = workers;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_engine_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn interval_bounds_are_inclusive() {
        assert!(validate_interval(0).is_err());
        assert!(validate_interval(MIN_INTERVAL_SECS).is_ok());
        assert!(validate_interval(MAX_INTERVAL_SECS).is_ok());
        assert!(validate_interval(MAX_INTERVAL_SECS + 1).is_err());
    }

    #[test]
    fn empty_destination_is_rejected() {
        let err = EngineConfig::new("", 5).validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn overlong_destination_is_rejected() {
        let long = "x".repeat(MAX_PATH_LEN + 1);
        assert!(validate_destination(Path::new(&long)).is_err());
        assert!(validate_destination(Path::new(&long[..MAX_PATH_LEN])).is_ok());
    }

    #[test]
    fn overrides_replace_only_what_they_set() {
        let mut config = Config::parse_toml("[engine]\nmessage = \"tick\"\n").unwrap();
        config.apply(&ConfigOverrides {
            interval_secs: Some(30),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.engine.interval_secs, 30);
        assert_eq!(config.engine.message, "tick");
        assert_eq!(config.engine.destination, Path::new(DEFAULT_DESTINATION));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = EngineConfig::new("/tmp/log", 5)
            .workers(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("workers"));
    }
}
