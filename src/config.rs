//! Configuration file parser for `feedhub.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde, though we log a warning when
//! the file contains potential typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::storage::{MAX_REFRESH_RATE, MIN_REFRESH_RATE};
use crate::util::HostPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level service configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the SQLite database file.
    pub database_path: String,

    /// Minutes between scheduler wake-ups (1-60).
    pub check_interval_minutes: u32,

    /// Start the refresh scheduler when `serve` starts.
    pub autostart_scheduler: bool,

    /// Cadence assigned to sources registered without an explicit one.
    pub default_refresh_rate: u32,

    /// Sources refreshed at once during a bulk refresh. 1 = sequential.
    pub max_concurrent_fetches: usize,

    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "feedhub.db".to_string(),
            check_interval_minutes: 5,
            autostart_scheduler: true,
            default_refresh_rate: 60,
            max_concurrent_fetches: 1,
            http: HttpConfig::default(),
        }
    }
}

/// Outbound HTTP settings shared by discovery, validation and sync.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    /// Retries for 429/5xx during synchronization (never for discovery).
    pub max_retries: u32,
    pub max_body_bytes: usize,
    pub user_agent: String,
    /// Permit fetching localhost and private network addresses.
    pub allow_private_hosts: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            max_body_bytes: 10 * 1024 * 1024,
            user_agent: concat!("feedhub/", env!("CARGO_PKG_VERSION")).to_string(),
            allow_private_hosts: false,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn host_policy(&self) -> HostPolicy {
        HostPolicy {
            allow_private_hosts: self.allow_private_hosts,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "database_path",
        "check_interval_minutes",
        "autostart_scheduler",
        "default_refresh_rate",
        "max_concurrent_fetches",
        "http",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        tracing::info!(
            database = %config.database_path,
            check_interval_minutes = config.check_interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=60).contains(&self.check_interval_minutes) {
            return Err(ConfigError::Invalid {
                key: "check_interval_minutes",
                reason: format!("{} is outside 1-60", self.check_interval_minutes),
            });
        }
        if !(MIN_REFRESH_RATE..=MAX_REFRESH_RATE).contains(&self.default_refresh_rate) {
            return Err(ConfigError::Invalid {
                key: "default_refresh_rate",
                reason: format!(
                    "{} is outside {MIN_REFRESH_RATE}-{MAX_REFRESH_RATE}",
                    self.default_refresh_rate
                ),
            });
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid {
                key: "max_concurrent_fetches",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
