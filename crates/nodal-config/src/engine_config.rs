//! Engine configuration file format.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Log levels accepted by `log_level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Runtime parameters of the engine.
///
/// Every field has a default, so a partial (or empty) file is valid.
///
/// # TOML Format
///
/// ```toml
/// sample_rate = 48000
/// block_size = 256
/// rt_queue_capacity = 1024
/// post_queue_capacity = 1024
/// inbound_capacity = 4096
/// housekeeping_interval_ms = 100
/// log_level = "info"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Samples per second; converts command timestamps to wall time.
    pub sample_rate: u32,

    /// Frames per real-time cycle. Must be a power of two.
    pub block_size: u32,

    /// Capacity of the queue from pre-processing to the real-time stage.
    pub rt_queue_capacity: usize,

    /// Capacity of the queue from the real-time stage to post-processing.
    pub post_queue_capacity: usize,

    /// Capacity of the inbound queue fed by decode threads.
    pub inbound_capacity: usize,

    /// Period of the reclaimer sweep.
    pub housekeeping_interval_ms: u64,

    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 256,
            rt_queue_capacity: 1024,
            post_queue_capacity: 1024,
            inbound_capacity: 4096,
            housekeeping_interval_ms: 100,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a TOML string. Does not validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every field for a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8_000..=384_000).contains(&self.sample_rate) {
            return Err(ConfigError::invalid(
                "sample_rate",
                format!("must be in 8000..=384000, got {}", self.sample_rate),
            ));
        }
        if !self.block_size.is_power_of_two() || !(16..=8192).contains(&self.block_size) {
            return Err(ConfigError::invalid(
                "block_size",
                format!("must be a power of two in 16..=8192, got {}", self.block_size),
            ));
        }
        for (field, value) in [
            ("rt_queue_capacity", self.rt_queue_capacity),
            ("post_queue_capacity", self.post_queue_capacity),
            ("inbound_capacity", self.inbound_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be at least 1"));
            }
        }
        if self.housekeeping_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "housekeeping_interval_ms",
                "must be at least 1",
            ));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::invalid(
                "log_level",
                format!("expected one of {LOG_LEVELS:?}, got '{}'", self.log_level),
            ));
        }
        Ok(())
    }

    /// Wall-clock length of one real-time cycle.
    pub fn cycle_duration(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.block_size) / f64::from(self.sample_rate))
    }

    /// Housekeeping period.
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms)
    }

    /// Converts a duration since engine start to a sample timestamp.
    pub fn frames_for(&self, elapsed: Duration) -> u64 {
        let frames = elapsed.as_secs_f64() * f64::from(self.sample_rate);
        frames as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.block_size, 256);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EngineConfig::from_toml("block_size = 64\nlog_level = \"debug\"").unwrap();
        assert_eq!(config.block_size, 64);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.rt_queue_capacity, 1024);
    }

    #[test]
    fn unknown_type_is_parse_error() {
        let err = EngineConfig::from_toml("block_size = \"big\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn rejects_bad_block_size() {
        let config = EngineConfig {
            block_size: 100,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "block_size", .. }));
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = EngineConfig {
            post_queue_capacity: 0,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "post_queue_capacity",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let config = EngineConfig {
            log_level: "loud".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn cycle_duration_matches_block() {
        let config = EngineConfig {
            sample_rate: 48000,
            block_size: 480,
            ..EngineConfig::default()
        };
        // 480 is not a power of two, but the arithmetic does not care.
        assert_eq!(config.cycle_duration(), Duration::from_millis(10));
        assert_eq!(config.frames_for(Duration::from_millis(500)), 24000);
    }

    #[test]
    fn to_toml_contains_fields() {
        let toml = EngineConfig::default().to_toml().unwrap();
        assert!(toml.contains("sample_rate = 48000"));
        assert!(toml.contains("log_level = \"info\""));
    }
}
