//! Configuration management
//!
//! This module handles loading and managing configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::ModelConfig;
use crate::training::TrainingConfig;

/// Batch source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Trajectories across both splits
    pub num_trajectories: usize,
    /// Speed range in km/h used for normalization
    pub speed_min: f64,
    pub speed_max: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            num_trajectories: 20_000,
            speed_min: 0.0,
            speed_max: 100.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub data: DataConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from file, falling back to defaults
    ///
    /// A missing file is not an error. Any other failure is returned next to
    /// the defaults so the caller can report it once logging is up.
    pub fn load_checked<P: AsRef<Path>>(path: P) -> (Self, Option<Error>) {
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => (Self::default(), None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Load configuration from file or use default, warning on a broken file
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let (config, err) = Self::load_checked(path);
        if let Some(e) = err {
            warn!("Could not load {}: {}; using defaults", path.display(), e);
        }
        config
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.training.validate()?;
        if self.data.speed_max < self.data.speed_min {
            return Err(Error::InvalidConfig(format!(
                "speed_max {} is below speed_min {}",
                self.data.speed_max, self.data.speed_min
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.model.site_num, 108);
        assert_eq!(config.model.field_cnt, 9);
        assert_eq!(config.training.validate_every, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.model.emb_size = 32;
        config.training.save_path = "runs/a".into();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.model.emb_size, 32);
        assert_eq!(loaded.training.save_path, Path::new("runs/a"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.training.batch_size, 32);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.model.emb_size, 64);

        let (config, err) = Config::load_checked("does/not/exist.toml");
        assert!(err.is_none());
        assert_eq!(config.training.batch_size, 32);
    }

    #[test]
    fn test_broken_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[model]\nemb_size = \"wide\"\n").unwrap();

        let (config, err) = Config::load_checked(&path);
        assert!(matches!(err, Some(Error::TomlDe(_))));
        assert_eq!(config.model.emb_size, 64);
    }

    #[test]
    fn test_invalid_heads_rejected() {
        let mut config = Config::default();
        config.model.num_heads = 7;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
