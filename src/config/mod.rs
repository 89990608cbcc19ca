//! Configuration management for docpull
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! Command-line flags are applied on top by the binary.
//!
//! # Usage
//!
//! ```no_run
//! use docpull::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Concurrency budget: {}", config.pipeline.concurrency);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `DOCPULL__<section>__<key>`
//!
//! Examples:
//! - `DOCPULL__PIPELINE__CONCURRENCY=25`
//! - `DOCPULL__OUTPUT__ARTIFACT_DIR=/srv/pdfs`
//! - `DOCPULL__FETCH__MAX_ARTIFACT_BYTES=50MB`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/docpull.toml`.
//! This can be overridden using the `DOCPULL_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::ByteSize;
pub use models::{
    Config, ExistingArtifactPolicy, FetchConfig, LoggingConfig, ManifestConfig, OutputConfig,
    PipelineConfig,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`DOCPULL__*`)
    /// 2. TOML file (default: `config/docpull.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Same as [`Config::load`] but with an explicit file taking precedence over
    /// `DOCPULL_CONFIG`. The result is not validated yet so callers can layer
    /// command-line overrides first.
    pub fn load_with(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Ok(sources::load(path)?)
    }

    /// Load and validate configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }

    /// Resolved configuration rendered as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
