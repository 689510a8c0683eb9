//! Configuration for the template cache

use crate::dependency::DEFAULT_START_FILE_NAME;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding [`CacheConfig::start_file_name`]
pub const ENV_START_FILE: &str = "TEMPLATE_CACHE_START_FILE";
/// Environment variable overriding [`CacheConfig::watch_all_dependency_locations`]
pub const ENV_WATCH_ALL_DEPENDENCIES: &str = "TEMPLATE_CACHE_WATCH_ALL_DEPENDENCIES";
/// Environment variable overriding [`CacheConfig::poll_interval`], in milliseconds
pub const ENV_POLL_INTERVAL_MS: &str = "TEMPLATE_CACHE_POLL_INTERVAL_MS";
/// Environment variable overriding [`CacheConfig::enable_metrics`]
pub const ENV_METRICS: &str = "TEMPLATE_CACHE_METRICS";

/// Configuration for the compilation cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// File name of the start files templates inherit from
    pub start_file_name: String,

    /// Watch every ancestor start-file location of a compiled template,
    /// not only the ones that currently have a cache entry.
    /// Lets a newly created start file invalidate existing templates.
    pub watch_all_dependency_locations: bool,

    /// Interval between file system polls of the physical provider
    pub poll_interval: Duration,

    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            start_file_name: DEFAULT_START_FILE_NAME.to_string(),
            watch_all_dependency_locations: false,
            poll_interval: Duration::from_secs(2),
            enable_metrics: true,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.start_file_name.trim().is_empty() {
            return Err(CacheError::ConfigError(
                "start_file_name must not be empty".to_string(),
            ));
        }

        if self.start_file_name.contains(['/', '\\']) {
            return Err(CacheError::ConfigError(format!(
                "start_file_name must be a bare file name, got '{}'",
                self.start_file_name
            )));
        }

        if self.poll_interval.is_zero() {
            return Err(CacheError::ConfigError(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from the environment.
    ///
    /// A `.env` file in the working directory is read first if present.
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(name) = lookup(ENV_START_FILE) {
            builder = builder.start_file_name(name);
        }

        if let Some(value) = lookup(ENV_WATCH_ALL_DEPENDENCIES) {
            let watch_all = parse_bool(ENV_WATCH_ALL_DEPENDENCIES, &value)?;
            builder = builder.watch_all_dependency_locations(watch_all);
        }

        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            let millis: u64 = value.trim().parse().map_err(|_| {
                CacheError::ConfigError(format!(
                    "{} must be an integer, got '{}'",
                    ENV_POLL_INTERVAL_MS, value
                ))
            })?;
            builder = builder.poll_interval(Duration::from_millis(millis));
        }

        if let Some(value) = lookup(ENV_METRICS) {
            builder = builder.enable_metrics(parse_bool(ENV_METRICS, &value)?);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CacheError::ConfigError(format!(
            "{} must be a boolean, got '{}'",
            name, value
        ))),
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    start_file_name: Option<String>,
    watch_all_dependency_locations: Option<bool>,
    poll_interval: Option<Duration>,
    enable_metrics: Option<bool>,
}

impl CacheConfigBuilder {
    /// Set the start file name
    pub fn start_file_name(mut self, name: impl Into<String>) -> Self {
        self.start_file_name = Some(name.into());
        self
    }

    /// Watch all ancestor start-file locations
    pub fn watch_all_dependency_locations(mut self, enable: bool) -> Self {
        self.watch_all_dependency_locations = Some(enable);
        self
    }

    /// Set the physical provider poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Enable or disable metrics collection
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            start_file_name: self.start_file_name.unwrap_or(defaults.start_file_name),
            watch_all_dependency_locations: self
                .watch_all_dependency_locations
                .unwrap_or(defaults.watch_all_dependency_locations),
            poll_interval: self.poll_interval.unwrap_or(defaults.poll_interval),
            enable_metrics: self.enable_metrics.unwrap_or(defaults.enable_metrics),
        }
    }
}

/// Preset configurations for common deployments
impl CacheConfig {
    /// Templates are edited while the process runs: poll quickly and react to
    /// newly created start files
    pub fn development() -> Self {
        Self {
            watch_all_dependency_locations: true,
            poll_interval: Duration::from_millis(500),
            ..Default::default()
        }
    }

    /// Templates change only on redeploy
    pub fn production() -> Self {
        Self {
            watch_all_dependency_locations: false,
            poll_interval: Duration::from_secs(30),
            ..Default::default()
        }
    }
}
