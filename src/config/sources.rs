use super::models::Config;
use config::{ConfigError, Environment, File, FileFormat};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "DOCPULL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/docpull.toml";
const ENV_PREFIX: &str = "DOCPULL";
const ENV_SEPARATOR: &str = "__";

/// Resolve the config file path: explicit argument, then `DOCPULL_CONFIG`, then the
/// default location
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(explicit: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    load_from_sources(config_path(explicit))
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).format(FileFormat::Toml).required(false));
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // DOCPULL__PIPELINE__CONCURRENCY -> pipeline.concurrency
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExistingArtifactPolicy;
    use crate::logging::LogLevel;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_from_sources(temp_dir.path().join("nonexistent.toml")).unwrap();

        assert_eq!(config.pipeline.concurrency, 10);
        assert_eq!(config.manifest.key_column, "BRnum");
        assert_eq!(config.output.existing_artifacts, ExistingArtifactPolicy::Skip);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[pipeline]
concurrency = 4
tick_interval_ms = 20

[manifest]
path = "data/GRI_2017_2020.csv"
delimiter = ";"

[fetch]
timeout_secs = 5
max_artifact_bytes = "20MB"

[output]
report_path = "out/report.csv"
existing_artifacts = "refetch"

[logging]
level = "trace"
file = "out/docpull.log"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.pipeline.concurrency, 4);
        assert_eq!(config.pipeline.drain_poll_ms, 50);
        assert_eq!(config.manifest.delimiter_byte(), b';');
        assert_eq!(config.fetch.max_artifact_bytes.as_u64(), 20 * 1024 * 1024);
        assert_eq!(config.output.existing_artifacts, ExistingArtifactPolicy::Refetch);
        assert_eq!(config.logging.level, LogLevel::Trace);
        assert_eq!(config.logging.file, Some(PathBuf::from("out/docpull.log")));
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        fs::write(&config_path, "[pipeline]\nconcurrency = \"many\"\n").unwrap();

        assert!(load_from_sources(config_path).is_err());
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = PathBuf::from("custom/docpull.toml");
        assert_eq!(config_path(Some(explicit.clone())), explicit);
    }
}
