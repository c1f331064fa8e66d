//! Configuration management for cronledger
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use cronledger::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Jobs directory: {}", config.jobs.directory.display());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `CRONLEDGER__<section>__<key>`
//!
//! Examples:
//! - `CRONLEDGER__JOBS__DIRECTORY=/etc/cronledger/jobs`
//! - `CRONLEDGER__AUDIT__COLLECTION=NIGHTLY_LOGS`
//! - `CRONLEDGER__RETENTION__RETENTION_WINDOW="30 days"`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/cronledger.toml`.
//! This can be overridden using the `CRONLEDGER_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{AuditConfig, Config, JobsConfig, RetentionConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`CRONLEDGER__*`)
    /// 2. TOML file (default: `config/cronledger.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (bad collection name, bad retention settings, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Check the configuration after command-line overrides were applied
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_partial_retention() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[retention]
frequency = "*/15 * * * * *"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        let options = config.retention.options();
        assert_eq!(options.frequency.as_deref(), Some("*/15 * * * * *"));
        assert_eq!(options.retention_window, None);
    }

    #[test]
    fn test_validation_catches_bad_window() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[retention]
retention_window = "soon"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::Retention(_))
        ));
    }

    #[test]
    fn test_malformed_file_is_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");
        fs::write(&config_path, "[audit\ncollection = ").unwrap();

        assert!(matches!(
            Config::load_from_path(config_path),
            Err(ConfigError::LoadError(_))
        ));
    }
}
