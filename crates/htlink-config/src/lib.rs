//! Shared configuration for htlink front ends.
//!
//! TOML profiles, `HTLINK_` environment overrides, and translation to
//! `htlink_core::CoordinatorConfig`. The coordinator never reads files;
//! it receives the translated config at construction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use htlink_core::CoordinatorConfig;
use htlink_core::config::{DEFAULT_BULK_BATCH_SIZE, DEFAULT_PORT, DEFAULT_UNAVAILABLE_AFTER};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is requested.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named heat pump profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Seconds per I/O step.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Seconds between polling cycles.
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            scan_interval: default_scan_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_scan_interval() -> u64 {
    30
}
fn default_port() -> u16 {
    DEFAULT_PORT
}

/// A named heat pump profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Host name or IP of the heat pump (or its serial-over-TCP bridge).
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Override the default timeout (seconds).
    pub timeout: Option<u64>,

    /// Override the default scan interval (seconds).
    pub scan_interval: Option<u64>,

    /// Parameters to poll. Empty selects the built-in default set.
    #[serde(default)]
    pub selected_params: Vec<String>,

    /// Allow write access to be confirmed at runtime.
    #[serde(default)]
    pub write_enabled: bool,

    /// Failed cycles before the heat pump counts as unavailable.
    pub unavailable_after: Option<u32>,

    /// Register numbers per bulk request.
    pub bulk_batch_size: Option<usize>,
}

impl Profile {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout: None,
            scan_interval: None,
            selected_params: Vec::new(),
            write_enabled: false,
            unavailable_after: None,
            bulk_batch_size: None,
        }
    }
}

impl Config {
    /// Requested name, else the configured default, else `"default"`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.into(),
                available: self.available_profiles(),
            })
    }

    /// Comma-separated profile names, or `(none)`.
    pub fn available_profiles(&self) -> String {
        if self.profiles.is_empty() {
            "(none)".into()
        } else {
            self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "htlink", "htlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("htlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the default path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file, then apply `HTLINK_` environment overrides
/// (`__` separates nesting, e.g. `HTLINK_PROFILES__HOME__HOST`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HTLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `CoordinatorConfig` from a profile and the global defaults.
pub fn profile_to_coordinator_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<CoordinatorConfig, ConfigError> {
    let invalid = |field: &str, reason: &str| ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    };

    let host = profile.host.trim();
    if host.is_empty() {
        return Err(invalid("host", "must not be empty"));
    }
    if profile.port == 0 {
        return Err(invalid("port", "must be between 1 and 65535"));
    }

    let timeout = profile.timeout.unwrap_or(defaults.timeout);
    if timeout == 0 {
        return Err(invalid("timeout", "must be at least one second"));
    }
    let scan_interval = profile.scan_interval.unwrap_or(defaults.scan_interval);
    if scan_interval == 0 {
        return Err(invalid("scan_interval", "must be at least one second"));
    }

    let unavailable_after = profile.unavailable_after.unwrap_or(DEFAULT_UNAVAILABLE_AFTER);
    if unavailable_after == 0 {
        return Err(invalid("unavailable_after", "must be at least 1"));
    }
    let bulk_batch_size = profile.bulk_batch_size.unwrap_or(DEFAULT_BULK_BATCH_SIZE);
    if bulk_batch_size == 0 {
        return Err(invalid("bulk_batch_size", "must be at least 1"));
    }

    Ok(CoordinatorConfig {
        host: host.to_owned(),
        port: profile.port,
        timeout: Duration::from_secs(timeout),
        scan_interval: Duration::from_secs(scan_interval),
        selected_params: profile.selected_params.clone(),
        write_enabled: profile.write_enabled,
        unavailable_after,
        bulk_batch_size,
    })
}
