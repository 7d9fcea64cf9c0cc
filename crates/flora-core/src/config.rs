//! Poller configuration.
//!
//! [`PollerConfig`] can be built in code or loaded from a TOML file:
//!
//! ```toml
//! cache_timeout_secs = 600
//! retries = 3
//! attempt_timeout_secs = 10
//! failure_backoff_secs = 300
//! firmware_refresh_secs = 86400
//! ```
//!
//! Missing keys fall back to the defaults shown above.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default time a measurement stays fresh.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(600);

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default timeout for one connect → operate → disconnect attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait before retrying a sensor whose last refresh failed.
pub const DEFAULT_FAILURE_BACKOFF: Duration = Duration::from_secs(300);

/// Default interval between firmware/battery reads.
pub const DEFAULT_FIRMWARE_REFRESH: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for a [`SensorPoller`](crate::SensorPoller).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use flora_core::PollerConfig;
///
/// let config = PollerConfig::default()
///     .cache_timeout(Duration::from_secs(300))
///     .retries(5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// How long a successful measurement is served from cache.
    #[serde(rename = "cache_timeout_secs", with = "duration_secs")]
    pub cache_timeout: Duration,
    /// Retries after the first attempt; `retries + 1` attempts in total.
    pub retries: u32,
    /// Timeout applied to each session attempt.
    #[serde(rename = "attempt_timeout_secs", with = "duration_secs")]
    pub attempt_timeout: Duration,
    /// Delay before the next mandatory refresh after a failed one.
    #[serde(rename = "failure_backoff_secs", with = "duration_secs")]
    pub failure_backoff: Duration,
    /// How long a firmware/battery read stays fresh.
    #[serde(rename = "firmware_refresh_secs", with = "duration_secs")]
    pub firmware_refresh: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            retries: DEFAULT_RETRIES,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            failure_backoff: DEFAULT_FAILURE_BACKOFF,
            firmware_refresh: DEFAULT_FIRMWARE_REFRESH,
        }
    }
}

impl PollerConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache timeout.
    #[must_use]
    pub fn cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    /// Set the number of retries.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the failure backoff.
    #[must_use]
    pub fn failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    /// Set the firmware refresh interval.
    #[must_use]
    pub fn firmware_refresh(mut self, interval: Duration) -> Self {
        self.firmware_refresh = interval;
        self
    }

    /// Check the configuration for values the poller cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.cache_timeout.is_zero() {
            errors.push("cache_timeout_secs must be greater than zero");
        }
        if self.attempt_timeout.is_zero() {
            errors.push("attempt_timeout_secs must be greater than zero");
        }
        if self.failure_backoff.is_zero() {
            errors.push("failure_backoff_secs must be greater than zero");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join("; ")))
        }
    }

    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this config.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The values are out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::InvalidConfig(err.to_string())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PollerConfig::default();
        assert_eq!(config.cache_timeout, Duration::from_secs(600));
        assert_eq!(config.retries, 3);
        assert_eq!(config.attempt_timeout, Duration::from_secs(10));
        assert_eq!(config.failure_backoff, Duration::from_secs(300));
        assert_eq!(config.firmware_refresh, Duration::from_secs(86_400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = PollerConfig::new()
            .cache_timeout(Duration::from_secs(60))
            .retries(0)
            .attempt_timeout(Duration::from_secs(2))
            .failure_backoff(Duration::from_secs(30))
            .firmware_refresh(Duration::from_secs(3600));

        assert_eq!(config.cache_timeout, Duration::from_secs(60));
        assert_eq!(config.retries, 0);
        assert_eq!(config.attempt_timeout, Duration::from_secs(2));
        assert_eq!(config.failure_backoff, Duration::from_secs(30));
        assert_eq!(config.firmware_refresh, Duration::from_secs(3600));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let config = PollerConfig::default()
            .cache_timeout(Duration::ZERO)
            .attempt_timeout(Duration::ZERO);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("cache_timeout_secs"));
        assert!(err.contains("attempt_timeout_secs"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PollerConfig = toml::from_str("retries = 7\ncache_timeout_secs = 120").unwrap();
        assert_eq!(config.retries, 7);
        assert_eq!(config.cache_timeout, Duration::from_secs(120));
        assert_eq!(config.failure_backoff, DEFAULT_FAILURE_BACKOFF);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PollerConfig::default().retries(1);
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("cache_timeout_secs = 600"));
        let back: PollerConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poller.toml");
        std::fs::write(&path, "retries = 5\nattempt_timeout_secs = 20\n").unwrap();

        let config = PollerConfig::load(&path).unwrap();
        assert_eq!(config.retries, 5);
        assert_eq!(config.attempt_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_load_missing_file() {
        let result = PollerConfig::load("/nonexistent/path/poller.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invalid.toml");
        std::fs::write(&path, "this is not valid { toml").unwrap();

        let result = PollerConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.toml");
        std::fs::write(&path, "cache_timeout_secs = 0\n").unwrap();

        let result = PollerConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
