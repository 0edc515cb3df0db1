//! # Configuration Management Module
//!
//! Pipeline tunables stored in a platform-appropriate location.
//! Handles loading, saving, validating and providing defaults.
//!
//! ## Settings
//! - Scheduling: `sampling_tick_ms`, `save_interval_ms`
//! - Buffering: `ring_buffer_capacity`, `gps_window_size`
//! - Speed gating: `gps_min_dt_secs`, `gps_max_dt_secs`, `max_speed_mps`
//! - Filter chain: `lowpass_alpha`, `highpass_alpha`, `accel_threshold`
//! - Session: `clear_on_start`, `database_path`
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/motion-logger/config.toml
//! - Linux: ~/.config/motion-logger/config.toml
//! - Windows: %APPDATA%\motion-logger\config.toml
//!
//! Missing keys fall back to their defaults, so an old config file keeps
//! working after new settings are added.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "motion-logger";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Period of the assembly tick in milliseconds
    pub sampling_tick_ms: u64,
    /// Minimum time between two persisted rows in milliseconds
    pub save_interval_ms: u64,
    pub ring_buffer_capacity: usize,
    pub gps_window_size: usize,
    /// Fix intervals at or below this are ignored for speed
    pub gps_min_dt_secs: f64,
    /// Fix intervals at or above this are ignored for speed
    pub gps_max_dt_secs: f64,
    pub max_speed_mps: f64,
    pub lowpass_alpha: f64,
    pub highpass_alpha: f64,
    pub accel_threshold: f64,
    /// Delete all persisted rows when a session starts
    pub clear_on_start: bool,
    /// SQLite file; `None` means the platform data directory
    pub database_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sampling_tick_ms: 5000,
            save_interval_ms: 5000,
            ring_buffer_capacity: 30,
            gps_window_size: 5,
            gps_min_dt_secs: 0.1,
            gps_max_dt_secs: 10.0,
            max_speed_mps: 55.5,
            lowpass_alpha: 0.45,
            highpass_alpha: 0.9,
            accel_threshold: 0.03,
            clear_on_start: true,
            database_path: None,
        }
    }
}

impl Config {
    /// Get the path to the config file
    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Database file to open, resolving the platform default
    pub fn database_file(&self) -> PathBuf {
        match &self.database_path {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("motion_data.db"),
        }
    }

    /// Load config from the platform location, or create default if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    /// Load config from an explicit path, writing defaults there if missing
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config = toml::from_str(&contents)
                    .map_err(ConfigError::ParseFailed)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    /// Save config to the platform location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_path())
    }

    /// Save config to an explicit path
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = self.to_toml()?;
        fs::write(path, toml_string)
            .map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.sampling_tick_ms == 0 {
            return invalid("sampling_tick_ms must be positive");
        }
        // The "last record of the batch" policy needs at least one tick per flush
        if self.save_interval_ms < self.sampling_tick_ms {
            return invalid("save_interval_ms must be >= sampling_tick_ms");
        }
        if self.ring_buffer_capacity == 0 {
            return invalid("ring_buffer_capacity must be positive");
        }
        if self.gps_window_size < 2 {
            return invalid("gps_window_size must hold at least two fixes");
        }
        if !(self.gps_min_dt_secs >= 0.0 && self.gps_min_dt_secs < self.gps_max_dt_secs) {
            return invalid("gps_min_dt_secs must be non-negative and below gps_max_dt_secs");
        }
        if !(self.max_speed_mps >= 0.0) {
            return invalid("max_speed_mps must be non-negative");
        }
        for (name, alpha) in [
            ("lowpass_alpha", self.lowpass_alpha),
            ("highpass_alpha", self.highpass_alpha),
        ] {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(ConfigError::Invalid(format!("{} must be in (0, 1]", name)));
            }
        }
        if !(self.accel_threshold >= 0.0) {
            return invalid("accel_threshold must be non-negative");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sampling_tick_ms, 5000);
        assert_eq!(config.save_interval_ms, 5000);
        assert_eq!(config.ring_buffer_capacity, 30);
        assert_eq!(config.gps_window_size, 5);
        assert_eq!(config.max_speed_mps, 55.5);
        assert_eq!(config.lowpass_alpha, 0.45);
        assert_eq!(config.highpass_alpha, 0.9);
        assert_eq!(config.accel_threshold, 0.03);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config {
            sampling_tick_ms: 1000,
            clear_on_start: false,
            ..Config::default()
        };

        let toml_str = toml::to_string(&config).expect("Failed to serialize");
        assert!(toml_str.contains("sampling_tick_ms = 1000"));
        assert!(toml_str.contains("clear_on_start = false"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            save_interval_ms = 10000
            lowpass_alpha = 0.3
        "#;

        let config: Config = toml::from_str(toml_str).expect("Failed to deserialize");
        assert_eq!(config.save_interval_ms, 10000);
        assert_eq!(config.lowpass_alpha, 0.3);
        assert_eq!(config.sampling_tick_ms, 5000);
        assert_eq!(config.gps_window_size, 5);
    }

    #[test]
    fn test_load_from_creates_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).expect("Failed to load config");
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "sampling_tick_ms = 5000\nsave_interval_ms = 1000\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validate_bounds() {
        let bad_alpha = Config { highpass_alpha: 0.0, ..Config::default() };
        assert!(bad_alpha.validate().is_err());

        let bad_dt = Config { gps_min_dt_secs: 10.0, ..Config::default() };
        assert!(bad_dt.validate().is_err());

        let bad_capacity = Config { ring_buffer_capacity: 0, ..Config::default() };
        assert!(bad_capacity.validate().is_err());

        let nan_cap = Config { max_speed_mps: f64::NAN, ..Config::default() };
        assert!(nan_cap.validate().is_err());
    }

    #[test]
    fn test_explicit_database_path() {
        let config = Config {
            database_path: Some(PathBuf::from("/tmp/x.db")),
            ..Config::default()
        };
        assert_eq!(config.database_file(), PathBuf::from("/tmp/x.db"));
        assert!(Config::default().database_file().ends_with("motion_data.db"));
    }
}
