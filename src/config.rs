// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON under the user configuration directory. Missing fields
//! take their defaults, so older files keep loading.

use crate::constants::{self, retry};
use crate::errors::ConfigError;
use crate::executor::ExecutorKind;
use crate::state::{ExponentialBackoff, FixedDelayRetry, ManualRetry, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How recoverable open failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetryConfig {
    /// The client re-requests the open
    #[default]
    Manual,
    /// Constant delay between attempts
    Fixed {
        delay_ms: u64,
        max_attempts: Option<u32>,
    },
    /// Doubling delay between attempts
    Exponential {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        max_attempts: Option<u32>,
    },
}

impl RetryConfig {
    /// Fixed delay retry with the default timing
    pub fn fixed_default() -> Self {
        RetryConfig::Fixed {
            delay_ms: retry::FIXED_DELAY.as_millis() as u64,
            max_attempts: Some(retry::MAX_ATTEMPTS),
        }
    }

    /// Exponential backoff with the default timing
    pub fn exponential_default() -> Self {
        RetryConfig::Exponential {
            initial_delay_ms: retry::BACKOFF_INITIAL_DELAY.as_millis() as u64,
            max_delay_ms: retry::BACKOFF_MAX_DELAY.as_millis() as u64,
            max_attempts: Some(retry::MAX_ATTEMPTS),
        }
    }

    pub fn policy(&self) -> Arc<dyn RetryPolicy> {
        match *self {
            RetryConfig::Manual => Arc::new(ManualRetry),
            RetryConfig::Fixed {
                delay_ms,
                max_attempts,
            } => Arc::new(FixedDelayRetry {
                delay: Duration::from_millis(delay_ms),
                max_attempts,
            }),
            RetryConfig::Exponential {
                initial_delay_ms,
                max_delay_ms,
                max_attempts,
            } => Arc::new(ExponentialBackoff {
                initial_delay: Duration::from_millis(initial_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms.max(initial_delay_ms)),
                max_attempts,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Retry behaviour after recoverable open failures
    pub retry: RetryConfig,
    /// Where platform callbacks run
    pub callback_executor: ExecutorKind,
    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            callback_executor: ExecutorKind::default(),
            log_filter: constants::DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// `<config dir>/camera-lifecycle/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| {
                dir.join(constants::CONFIG_DIR_NAME)
                    .join(constants::CONFIG_FILE_NAME)
            })
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load `path`, falling back to defaults if it is missing or unreadable
    pub fn load_or_default(path: &Path) -> Self {
        let (config, error) = Self::load_reporting(path);
        if let Some(e) = error {
            warn!(error = %e, "Failed to load configuration, using defaults");
        }
        config
    }

    /// Like [`Self::load_or_default`], but hands the load error back instead of logging it
    ///
    /// A missing file is not an error. Used before logging is set up.
    pub fn load_reporting(path: &Path) -> (Self, Option<ConfigError>) {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return (Self::default(), None);
        }
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Write the configuration, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, contents).map_err(io_error)?;
        debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_json_shape() {
        let json = serde_json::to_value(RetryConfig::Fixed {
            delay_ms: 250,
            max_attempts: Some(3),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "mode": "fixed", "delay_ms": 250, "max_attempts": 3 })
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{ "log_filter": "debug" }"#).unwrap();
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.retry, RetryConfig::Manual);
        assert_eq!(config.callback_executor, ExecutorKind::Thread);
    }

    #[test]
    fn test_exponential_max_delay_never_below_initial() {
        let policy = RetryConfig::Exponential {
            initial_delay_ms: 800,
            max_delay_ms: 100,
            max_attempts: None,
        }
        .policy();
        assert!(format!("{:?}", policy).contains("max_delay: 800ms"));
    }
}
