//! Tracing subscriber setup and pipeline counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

use crate::logging::LogLevel;

/// Install the global fmt subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: LogLevel) {
    let default_directive = match level {
        LogLevel::Trace => "trace",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error | LogLevel::Fatal => "error",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("docpull={default_directive}")));

    // A second init (e.g. from tests) is harmless
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Counters shared by the executor and the download tasks
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    tasks_submitted: AtomicU64,
    tasks_failed: AtomicU64,
    documents_fetched: AtomicU64,
    documents_failed: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "tasks_submitted", "Metric incremented");
    }

    pub fn task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "tasks_failed", "Metric incremented");
    }

    pub fn document_fetched(&self) {
        self.documents_fetched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "documents_fetched", "Metric incremented");
    }

    pub fn document_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "documents_failed", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            documents_fetched: self.documents_fetched.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tasks_submitted: u64,
    pub tasks_failed: u64,
    pub documents_fetched: u64,
    pub documents_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = PipelineMetrics::new();
        metrics.task_submitted();
        metrics.task_submitted();
        metrics.document_fetched();
        metrics.document_failed();
        metrics.task_failed();

        let snap = metrics.snapshot();
        assert_eq!(snap.tasks_submitted, 2);
        assert_eq!(snap.tasks_failed, 1);
        assert_eq!(snap.documents_fetched, 1);
        assert_eq!(snap.documents_failed, 1);
    }
}
