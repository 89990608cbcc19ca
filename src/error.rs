use thiserror::Error;

use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::logging::FatalError;
use crate::storage::StorageError;

/// Failures that end a pipeline run. Everything a single task can hit is settled
/// inside that task; only these reach the caller of `Orchestrator::run`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source read failed: {0}")]
    SourceRead(FatalError),

    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error("Artifact storage unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP client setup failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
