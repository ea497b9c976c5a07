use crate::paths::AppDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub browse: BrowseConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            logging: LoggingConfig::default(),
            bus: BusConfig::default(),
            browse: BrowseConfig::default(),
            renderer: RendererConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
    #[serde(default = "default_stdout_enabled")]
    pub stdout: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_log_files: default_max_log_files(),
            stdout: default_stdout_enabled(),
            file_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Naming of exported services, object paths and error replies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusConfig {
    /// Service name prefix; the plugin name is appended.
    #[serde(default = "default_service_prefix")]
    pub service_prefix: String,
    /// Object path prefix; `/<kind>/<uuid>` is appended.
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    /// Prefix of error reply names.
    #[serde(default = "default_error_prefix")]
    pub error_prefix: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            service_prefix: default_service_prefix(),
            path_prefix: default_path_prefix(),
            error_prefix: default_error_prefix(),
        }
    }
}

/// Batching tunables of streamed browse results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrowseConfig {
    #[serde(default = "default_initial_quota")]
    pub initial_quota: usize,
    #[serde(default = "default_quota_growth")]
    pub quota_growth: usize,
    #[serde(default = "default_max_quota")]
    pub max_quota: usize,
    #[serde(default = "default_initial_timeout_ms")]
    pub initial_timeout_ms: u64,
    #[serde(default = "default_timeout_step_ms")]
    pub timeout_step_ms: u64,
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            initial_quota: default_initial_quota(),
            quota_growth: default_quota_growth(),
            max_quota: default_max_quota(),
            initial_timeout_ms: default_initial_timeout_ms(),
            timeout_step_ms: default_timeout_step_ms(),
            max_timeout_ms: default_max_timeout_ms(),
        }
    }
}

impl BrowseConfig {
    pub fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms)
    }

    pub fn timeout_step(&self) -> Duration {
        Duration::from_millis(self.timeout_step_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RendererConfig {
    /// Minimum spacing of coalesced buffering-info signals.
    #[serde(default = "default_buffering_interval_ms")]
    pub buffering_interval_ms: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            buffering_interval_ms: default_buffering_interval_ms(),
        }
    }
}

impl RendererConfig {
    pub fn buffering_interval(&self) -> Duration {
        Duration::from_millis(self.buffering_interval_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config validation failed: {0}")]
    Validation(ValidationError),
    #[error("failed to prepare configuration directories: {0}")]
    Directories(#[from] crate::paths::DirsError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported config_version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("browse.{field} must be greater than zero")]
    ZeroBrowseSetting { field: &'static str },
    #[error("browse.initial_quota ({initial}) exceeds browse.max_quota ({max})")]
    QuotaRange { initial: usize, max: usize },
    #[error("browse.initial_timeout_ms ({initial}) exceeds browse.max_timeout_ms ({max})")]
    TimeoutRange { initial: u64, max: u64 },
    #[error("renderer.buffering_interval_ms must be greater than zero")]
    ZeroBufferingInterval,
    #[error("bus.service_prefix is not a valid bus name: {0:?}")]
    InvalidServicePrefix(String),
    #[error("bus.path_prefix is not a valid object path: {0:?}")]
    InvalidPathPrefix(String),
}

impl Config {
    pub fn load_or_default(dirs: &AppDirs) -> Result<Self, ConfigError> {
        dirs.ensure_exists()?;
        let path = Self::config_path(dirs);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    pub fn config_path(dirs: &AppDirs) -> PathBuf {
        dirs.config_dir().join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.config_version != CURRENT_CONFIG_VERSION {
            return Err(ValidationError::UnsupportedVersion {
                found: self.config_version,
                expected: CURRENT_CONFIG_VERSION,
            });
        }

        let browse = &self.browse;
        for (field, value) in [
            ("initial_quota", browse.initial_quota as u64),
            ("quota_growth", browse.quota_growth as u64),
            ("initial_timeout_ms", browse.initial_timeout_ms),
        ] {
            if value == 0 {
                return Err(ValidationError::ZeroBrowseSetting { field });
            }
        }
        if browse.initial_quota > browse.max_quota {
            return Err(ValidationError::QuotaRange {
                initial: browse.initial_quota,
                max: browse.max_quota,
            });
        }
        if browse.initial_timeout_ms > browse.max_timeout_ms {
            return Err(ValidationError::TimeoutRange {
                initial: browse.initial_timeout_ms,
                max: browse.max_timeout_ms,
            });
        }

        if self.renderer.buffering_interval_ms == 0 {
            return Err(ValidationError::ZeroBufferingInterval);
        }

        if !is_valid_bus_name(&self.bus.service_prefix) {
            return Err(ValidationError::InvalidServicePrefix(
                self.bus.service_prefix.clone(),
            ));
        }
        if !is_valid_path_prefix(&self.bus.path_prefix) {
            return Err(ValidationError::InvalidPathPrefix(self.bus.path_prefix.clone()));
        }
        Ok(())
    }
}

fn is_valid_bus_name(name: &str) -> bool {
    let elements: Vec<&str> = name.split('.').collect();
    elements.len() >= 2
        && elements.iter().all(|element| {
            !element.is_empty()
                && !element.starts_with(|c: char| c.is_ascii_digit())
                && element
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

fn is_valid_path_prefix(path: &str) -> bool {
    path.starts_with('/')
        && path.len() > 1
        && path[1..].split('/').all(|element| {
            !element.is_empty() && element.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn default_config_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_max_log_files() -> usize {
    7
}

fn default_stdout_enabled() -> bool {
    true
}

fn default_service_prefix() -> String {
    "io.mediabridge.plugin".to_string()
}

fn default_path_prefix() -> String {
    "/io/mediabridge".to_string()
}

fn default_error_prefix() -> String {
    "io.mediabridge.Error".to_string()
}

fn default_initial_quota() -> usize {
    25
}

fn default_quota_growth() -> usize {
    3
}

fn default_max_quota() -> usize {
    500
}

fn default_initial_timeout_ms() -> u64 {
    100
}

fn default_timeout_step_ms() -> u64 {
    500
}

fn default_max_timeout_ms() -> u64 {
    1000
}

fn default_buffering_interval_ms() -> u64 {
    500
}
