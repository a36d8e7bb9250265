//! Daemon configuration
//!
//! Loaded from a TOML file; every field has a default matching the
//! Raspberry Pi rig this grew up on, so an empty file (or none at all)
//! yields a working hardware configuration. `MUXDASH_CONFIG` names the
//! file when no path is given on the command line; `MUXDASH_BIND`
//! overrides the HTTP bind address for containerized runs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which rig implementation to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RigMode {
    /// Real buses and sensors
    #[default]
    Hardware,
    /// Random-value digital twin, no hardware required
    Mock,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct I2cConfig {
    /// Bus device paths, scanned in order
    pub buses: Vec<String>,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            buses: vec!["/dev/i2c-0".into(), "/dev/i2c-1".into()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sps30Config {
    /// Set to false on rigs without the particulate sensor
    pub enabled: bool,
    pub port: String,
    pub baud: u32,
    pub poll_interval_ms: u64,
}

impl Default for Sps30Config {
    fn default() -> Self {
        Self {
            enabled: true,
            port: "/dev/ttyAMA0".into(),
            baud: 115_200,
            poll_interval_ms: 1_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpiConfig {
    /// Set to true on rigs with the accelerometer fitted
    pub enabled: bool,
    pub device: String,
    pub speed_hz: u32,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device: "/dev/spidev0.0".into(),
            speed_hz: 1_000_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts per sensor read, including the first
    pub attempts: u32,
    /// Delay before the first retry; doubles per retry
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff_ms: 20,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> crate::ports::RetryPolicy {
        crate::ports::RetryPolicy {
            attempts: self.attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub bind: String,
    /// WebSocket broadcast interval
    pub broadcast_interval_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            broadcast_interval_ms: 2_000,
        }
    }
}

/// Top-level daemon configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RigConfig {
    pub mode: RigMode,
    /// Seed for the mock rig; random when absent
    pub mock_seed: Option<u64>,
    pub i2c: I2cConfig,
    pub sps30: Sps30Config,
    pub spi: SpiConfig,
    pub http: HttpConfig,
    pub retry: RetryConfig,
}

/// Error loading or parsing a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl RigConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: RigConfig = toml::from_str(&text)?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_defaults() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// `MUXDASH_CONFIG` names the file to load; without it, defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("MUXDASH_CONFIG") {
            Ok(path) if !path.is_empty() => Self::load(path),
            _ => Ok(Self::from_defaults()),
        }
    }

    fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("MUXDASH_BIND") {
            if !bind.is_empty() {
                self.http.bind = bind;
            }
        }
    }

    pub fn sps30_interval(&self) -> Duration {
        Duration::from_millis(self.sps30.poll_interval_ms)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.http.broadcast_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config: RigConfig = toml::from_str("").unwrap();
        assert_eq!(config, RigConfig::default());
        assert_eq!(config.mode, RigMode::Hardware);
        assert_eq!(config.i2c.buses.len(), 2);
        assert!(config.sps30.enabled);
        assert!(!config.spi.enabled);
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let config: RigConfig = toml::from_str(
            r#"
            mode = "mock"
            mock_seed = 7

            [http]
            bind = "127.0.0.1:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, RigMode::Mock);
        assert_eq!(config.mock_seed, Some(7));
        assert_eq!(config.http.bind, "127.0.0.1:9000");
        // untouched sections keep their defaults
        assert_eq!(config.sps30, Sps30Config::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<RigConfig>("sensors = 3").is_err());
    }

    #[test]
    fn retry_policy_floors_attempts_at_one() {
        let retry = RetryConfig {
            attempts: 0,
            initial_backoff_ms: 5,
        };
        let policy = retry.policy();
        assert_eq!(policy.attempts, 1);
        assert_eq!(policy.initial_backoff, Duration::from_millis(5));
    }
}
