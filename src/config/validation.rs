use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("pipeline.concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("Interval must be positive: {field} = 0")]
    ZeroInterval { field: &'static str },

    #[error("Column name must not be empty: {field}")]
    EmptyColumn { field: &'static str },

    #[error("Delimiter must be a single ASCII character, got '{0}'")]
    InvalidDelimiter(String),

    #[error("Artifact extension '{0}' must be non-empty and contain no path separator")]
    InvalidExtension(String),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_pipeline(config)?;
    validate_manifest(config)?;
    validate_intervals(config)?;
    validate_output(config)?;
    Ok(())
}

fn validate_pipeline(config: &Config) -> Result<(), ValidationError> {
    if config.pipeline.concurrency == 0 {
        return Err(ValidationError::ZeroConcurrency);
    }
    Ok(())
}

fn validate_manifest(config: &Config) -> Result<(), ValidationError> {
    let manifest = &config.manifest;
    if manifest.key_column.trim().is_empty() {
        return Err(ValidationError::EmptyColumn {
            field: "manifest.key_column",
        });
    }
    if manifest.url_column.trim().is_empty() {
        return Err(ValidationError::EmptyColumn {
            field: "manifest.url_column",
        });
    }
    if manifest.delimiter.len() != 1 || !manifest.delimiter.is_ascii() {
        return Err(ValidationError::InvalidDelimiter(manifest.delimiter.clone()));
    }
    Ok(())
}

fn validate_intervals(config: &Config) -> Result<(), ValidationError> {
    let checks = [
        ("pipeline.tick_interval_ms", config.pipeline.tick_interval_ms),
        ("pipeline.drain_poll_ms", config.pipeline.drain_poll_ms),
        ("fetch.timeout_secs", config.fetch.timeout_secs),
        ("fetch.connect_timeout_secs", config.fetch.connect_timeout_secs),
        ("logging.idle_sleep_ms", config.logging.idle_sleep_ms),
    ];

    match checks.iter().find(|(_, value)| *value == 0) {
        Some((field, _)) => Err(ValidationError::ZeroInterval { field: *field }),
        None => Ok(()),
    }
}

fn validate_output(config: &Config) -> Result<(), ValidationError> {
    let ext = &config.output.artifact_extension;
    if ext.is_empty() || ext.contains(['/', '\\']) {
        return Err(ValidationError::InvalidExtension(ext.clone()));
    }
    Ok(())
}
