//! Configuration management for vigild.
//!
//! Loads settings from /etc/vigil/config.toml or uses defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/vigil/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    /// Path of the SQLite monitoring store
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Scheduler tick interval in seconds
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Simulated training duration in seconds
    #[serde(default = "default_training_secs")]
    pub training_secs: u64,

    /// Fraction of simulated training runs that fail
    #[serde(default = "default_training_failure_rate")]
    pub training_failure_rate: f64,

    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_db_path() -> String {
    vigil_common::store::MONITOR_DB_PATH.to_string()
}

fn default_tick_secs() -> u64 {
    60
}

fn default_training_secs() -> u64 {
    30
}

fn default_training_failure_rate() -> f64 {
    0.05
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            tick_secs: default_tick_secs(),
            training_secs: default_training_secs(),
            training_failure_rate: default_training_failure_rate(),
            log_level: default_log_level(),
        }
    }
}

impl VigilConfig {
    /// Load from a path, falling back to defaults on a missing or
    /// unparseable file.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Failed to parse {}: {e}. Using defaults.", path.display());
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn training_options(&self) -> vigil_common::training::TrainingOptions {
        vigil_common::training::TrainingOptions {
            simulate_for: std::time::Duration::from_secs(self.training_secs),
            failure_rate: self.training_failure_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = VigilConfig::default();
        assert_eq!(config.tick_secs, 60);
        assert_eq!(config.training_secs, 30);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tick_secs = 5").unwrap();
        let config = VigilConfig::load(file.path());
        assert_eq!(config.tick_secs, 5);
        assert_eq!(config.training_secs, 30);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = VigilConfig::load("/nonexistent/vigil.toml");
        assert_eq!(config.tick_secs, 60);
    }

    #[test]
    fn test_garbage_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tick_secs = \"not a number").unwrap();
        let config = VigilConfig::load(file.path());
        assert_eq!(config.tick_secs, 60);
    }
}
