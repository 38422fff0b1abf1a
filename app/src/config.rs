//! Configuration management for localtodo.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unlike missing variables, malformed values are reported as errors.

use crate::persistence::{
    DEFAULT_KEY_PREFIX, DEFAULT_SNAPSHOT_KEY, DEFAULT_WRITE_DELAY, PersistenceLayout,
};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Value of `LOCALTODO_STORAGE_PATH` selecting process-local storage
pub const MEMORY_STORAGE: &str = ":memory:";

/// A configuration variable held an unusable value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value `{value}` for {var}: {reason}")]
pub struct ConfigError {
    /// Environment variable name
    pub var: &'static str,
    /// Offending value
    pub value: String,
    /// What was expected
    pub reason: &'static str,
}

/// Where todo data is kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// JSON document on disk
    File(PathBuf),
    /// Nothing survives the process
    Memory,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Storage backend (`LOCALTODO_STORAGE_PATH`, default `localtodo.json`)
    pub storage: StorageBackend,
    /// Storage layout (`LOCALTODO_LAYOUT`: `per-record` or `snapshot`)
    pub layout: PersistenceLayout,
    /// Per-record key prefix (`LOCALTODO_KEY_PREFIX`)
    pub key_prefix: String,
    /// Delay before writes reach storage (`LOCALTODO_WRITE_DELAY_MS`, default 100)
    pub write_delay: Duration,
    /// How long shutdown waits for pending writes (`LOCALTODO_SHUTDOWN_TIMEOUT_MS`, default 2000)
    pub shutdown_timeout: Duration,
    /// Fallback log filter when `RUST_LOG` is unset (`LOCALTODO_LOG_LEVEL`, default `info`)
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::File(PathBuf::from("localtodo.json")),
            layout: PersistenceLayout::PerRecord,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            write_delay: DEFAULT_WRITE_DELAY,
            shutdown_timeout: Duration::from_millis(2000),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first variable with an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first variable with an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let storage = match lookup("LOCALTODO_STORAGE_PATH") {
            Some(path) if path.trim() == MEMORY_STORAGE => StorageBackend::Memory,
            Some(path) if path.trim().is_empty() => {
                return Err(ConfigError {
                    var: "LOCALTODO_STORAGE_PATH",
                    value: path,
                    reason: "expected a file path or :memory:",
                });
            },
            Some(path) => StorageBackend::File(PathBuf::from(path.trim())),
            None => defaults.storage,
        };

        let key_prefix = match lookup("LOCALTODO_KEY_PREFIX") {
            Some(prefix) if prefix.is_empty() => {
                return Err(ConfigError {
                    var: "LOCALTODO_KEY_PREFIX",
                    value: prefix,
                    reason: "prefix must not be empty",
                });
            },
            Some(prefix) => prefix,
            None => defaults.key_prefix,
        };

        let snapshot_key = match lookup("LOCALTODO_SNAPSHOT_KEY") {
            Some(key) if key.is_empty() => {
                return Err(ConfigError {
                    var: "LOCALTODO_SNAPSHOT_KEY",
                    value: key,
                    reason: "key must not be empty",
                });
            },
            Some(key) => key,
            None => DEFAULT_SNAPSHOT_KEY.to_string(),
        };

        let layout = match lookup("LOCALTODO_LAYOUT").as_deref().map(str::trim) {
            None | Some("per-record") => PersistenceLayout::PerRecord,
            Some("snapshot") => PersistenceLayout::Snapshot { key: snapshot_key },
            Some(other) => {
                return Err(ConfigError {
                    var: "LOCALTODO_LAYOUT",
                    value: other.to_string(),
                    reason: "expected per-record or snapshot",
                });
            },
        };

        Ok(Self {
            storage,
            layout,
            key_prefix,
            write_delay: millis(&lookup, "LOCALTODO_WRITE_DELAY_MS")?
                .unwrap_or(defaults.write_delay),
            shutdown_timeout: millis(&lookup, "LOCALTODO_SHUTDOWN_TIMEOUT_MS")?
                .unwrap_or(defaults.shutdown_timeout),
            log_level: lookup("LOCALTODO_LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    lookup(var)
        .map(|raw| {
            raw.trim()
                .parse()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError {
                    var,
                    value: raw,
                    reason: "expected a whole number of milliseconds",
                })
        })
        .transpose()
}
