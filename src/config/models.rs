use crate::humanize::ByteSize;
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Control loop and concurrency settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Maximum number of one-shot tasks submitted at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Poll interval while waiting for the executor to drain
    #[serde(default = "default_drain_poll_ms")]
    pub drain_poll_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            tick_interval_ms: default_tick_interval_ms(),
            drain_poll_ms: default_drain_poll_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn drain_poll(&self) -> Duration {
        Duration::from_millis(self.drain_poll_ms)
    }
}

fn default_concurrency() -> usize {
    10
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_drain_poll_ms() -> u64 {
    50
}

/// Where the manifest lives and which columns to read
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestConfig {
    #[serde(default = "default_manifest_path")]
    pub path: PathBuf,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default = "default_url_column")]
    pub url_column: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: default_manifest_path(),
            key_column: default_key_column(),
            url_column: default_url_column(),
            delimiter: default_delimiter(),
        }
    }
}

impl ManifestConfig {
    /// Validation guarantees a single ASCII character
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter.bytes().next().unwrap_or(b',')
    }
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("manifest.csv")
}

fn default_key_column() -> String {
    "BRnum".to_string()
}

fn default_url_column() -> String {
    "Pdf_URL".to_string()
}

fn default_delimiter() -> String {
    ",".to_string()
}

/// HTTP fetch settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: ByteSize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            max_artifact_bytes: default_max_artifact_bytes(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    concat!("docpull/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_redirects() -> usize {
    10
}

fn default_max_artifact_bytes() -> ByteSize {
    ByteSize(100 * 1024 * 1024) // 100 MB
}

/// What to do with an artifact that is already on disk when the manifest is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingArtifactPolicy {
    /// Mark the row Fetched without downloading again
    Skip,
    /// Download again and overwrite
    Refetch,
}

impl Default for ExistingArtifactPolicy {
    fn default() -> Self {
        ExistingArtifactPolicy::Skip
    }
}

/// Report and artifact destinations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
    #[serde(default)]
    pub existing_artifacts: ExistingArtifactPolicy,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_path: default_report_path(),
            artifact_dir: default_artifact_dir(),
            artifact_extension: default_artifact_extension(),
            existing_artifacts: ExistingArtifactPolicy::default(),
        }
    }
}

fn default_report_path() -> PathBuf {
    PathBuf::from("report.csv")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_artifact_extension() -> String {
    "pdf".to_string()
}

/// Pipeline log settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Optional file that receives every drained entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Sleep between empty-queue checks in the log task
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            file: None,
            idle_sleep_ms: default_idle_sleep_ms(),
        }
    }
}

impl LoggingConfig {
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}

fn default_idle_sleep_ms() -> u64 {
    50
}
