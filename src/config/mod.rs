//! Configuration for the authorization engine.
//!
//! Configured via a TOML file or embedded string. All sections are
//! optional with sensible defaults, so a minimal deployment needs no
//! configuration at all.
//!
//! # Example
//!
//! ```toml
//! [cache]
//! ttl_ms = 30000
//! rebuild_timeout_ms = 5000
//!
//! [audit]
//! enabled = true
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Root configuration for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    /// Snapshot cache behavior.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Audit record emission.
    #[serde(default)]
    pub audit: AuditSettings,

    /// Diagnostic logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AccessConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()
    }
}

/// Snapshot cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    /// Staleness window in milliseconds. Within the window a snapshot is
    /// served without consulting the role repository; after it the
    /// repository's version counter is re-checked before the snapshot is
    /// trusted again.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Upper bound on a single rebuild attempt against the role
    /// repository, in milliseconds. On timeout the attempt is abandoned
    /// and retried on the next query.
    #[serde(default = "default_rebuild_timeout_ms")]
    pub rebuild_timeout_ms: u64,

    /// Memoize OR-merged trees per role combination inside the snapshot.
    /// Worth it under read concurrency with a stable role set; costs
    /// memory proportional to the number of distinct combinations seen.
    #[serde(default = "default_memoize_merges")]
    pub memoize_merges: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            rebuild_timeout_ms: default_rebuild_timeout_ms(),
            memoize_merges: default_memoize_merges(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn rebuild_timeout(&self) -> Duration {
        Duration::from_millis(self.rebuild_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rebuild_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "cache.rebuild_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_ttl_ms() -> u64 {
    30_000
}

fn default_rebuild_timeout_ms() -> u64 {
    5_000
}

fn default_memoize_merges() -> bool {
    true
}

/// Audit emission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditSettings {
    /// When disabled, the logging entry point behaves like the
    /// non-logging one and no audit records are emitted at all.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
        }
    }
}

fn default_audit_enabled() -> bool {
    true
}

/// Diagnostic logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Console output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}
