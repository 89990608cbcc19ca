//! Download task: fetch one record's document into artifact storage
//!
//! The task is bound to a single record when it is built and is the only writer of
//! that record until it finishes. The fetch and the artifact write run in their own
//! spawned task so a panic in either is contained here, where the record can still
//! be settled, instead of leaving the row claimed forever.

use async_trait::async_trait;
use bon::bon;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use super::{Task, TaskCore};
use crate::fetch::{FetchError, Fetcher};
use crate::logging::Logger;
use crate::observability::PipelineMetrics;
use crate::record::{Record, RecordStatus};
use crate::shared::{ReportStore, guard};
use crate::storage::{ArtifactStore, StorageError};

#[derive(Debug, Error)]
enum DownloadFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("storing artifact failed: {0}")]
    Store(#[from] StorageError),

    #[error("cancelled")]
    Cancelled,
}

pub struct DownloadTask {
    core: TaskCore,
    record: Mutex<Record>,
    fetcher: Arc<dyn Fetcher>,
    artifacts: ArtifactStore,
    reports: Arc<ReportStore>,
    timeout: Duration,
    logger: Logger,
    metrics: Arc<PipelineMetrics>,
}

#[bon]
impl DownloadTask {
    #[builder]
    pub fn new(
        record: Record,
        fetcher: Arc<dyn Fetcher>,
        artifacts: ArtifactStore,
        reports: Arc<ReportStore>,
        timeout: Duration,
        logger: Logger,
        #[builder(default)] metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            core: TaskCore::one_shot(format!("Download {}", record.business_key)),
            record: Mutex::new(record),
            fetcher,
            artifacts,
            reports,
            timeout,
            logger,
            metrics,
        }
    }
}

impl DownloadTask {
    /// Fetch and store on a separate task. `Err` means neither the success nor the
    /// failure branch got to run.
    async fn attempt(&self, url: String, key: String) -> Result<Result<usize, DownloadFailure>, String> {
        let fetcher = self.fetcher.clone();
        let artifacts = self.artifacts.clone();
        let timeout = self.timeout;
        let mut stop = self.core.stop_signal();

        let job = tokio::spawn(async move {
            let body: Bytes = tokio::select! {
                fetched = fetcher.fetch(&url, timeout) => fetched?,
                _ = stop.raised() => return Err(DownloadFailure::Cancelled),
            };
            Ok::<usize, DownloadFailure>(artifacts.put(&key, body).await?)
        });

        job.await.map_err(|e| e.to_string())
    }

    async fn discard_partial(&self, key: &str) {
        match self.artifacts.delete(key).await {
            Ok(true) => self
                .logger
                .trace(format!("Removed partial artifact {}", self.artifacts.display_path(key))),
            Ok(false) => {}
            Err(e) => self
                .logger
                .warn(format!("Could not remove partial artifact for {key}: {e}")),
        }
    }

    fn settle(&self, record: Record) {
        self.reports.write(record.clone());
        *guard(&self.record) = record;
    }
}

#[async_trait]
impl Task for DownloadTask {
    type Output = Record;

    fn core(&self) -> &TaskCore {
        &self.core
    }

    async fn start(&self) {
        let mut record = guard(&self.record).clone();
        let key = record.business_key.clone();

        if !self.core.begin() {
            // Stopped before a worker picked it up
            if record.status == RecordStatus::Staged {
                record.status = RecordStatus::NotFetched;
                self.settle(record);
            }
            return;
        }

        if record.status != RecordStatus::Staged {
            self.logger.warn(format!(
                "{} is {} rather than Staged, not downloading",
                key, record.status
            ));
            self.stop();
            return;
        }

        let mut failed = false;
        match self.attempt(record.url.clone(), key.clone()).await {
            Ok(Ok(size)) => {
                self.logger.trace(format!(
                    "Downloaded {} ({} bytes)",
                    self.artifacts.display_path(&key),
                    size
                ));
                record.status = RecordStatus::Fetched;
            }
            Ok(Err(e)) => {
                self.logger
                    .error(format!("Failed to download {} from {}: {}", key, record.url, e));
                self.discard_partial(&key).await;
                record.status = RecordStatus::NotFetched;
                failed = true;
            }
            Err(e) => {
                self.logger.error(format!("Download of {} aborted: {}", key, e));
            }
        }

        if record.status == RecordStatus::Staged {
            self.logger.error(format!(
                "ProgrammingInvariantViolation: {} still Staged after its download finished",
                key
            ));
            self.discard_partial(&key).await;
            record.status = RecordStatus::NotFetched;
            failed = true;
        }

        self.settle(record);
        if failed {
            self.metrics.document_failed();
            self.core.fail();
        } else {
            self.metrics.document_fetched();
            self.stop();
        }
    }

    fn read_result(&self) -> Record {
        guard(&self.record).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch;
    use crate::logging::LogLevel;
    use crate::task::Lifecycle;

    enum Behaviour {
        Serve(&'static [u8]),
        Fail,
        Hang,
        Panic,
    }

    struct StubFetcher(Behaviour);

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str, timeout: Duration) -> fetch::Result<Bytes> {
            match self.0 {
                Behaviour::Serve(body) => Ok(Bytes::from_static(body)),
                Behaviour::Fail => Err(FetchError::Timeout(timeout)),
                Behaviour::Hang => std::future::pending().await,
                Behaviour::Panic => panic!("fetcher exploded on {url}"),
            }
        }
    }

    struct Fixture {
        task: DownloadTask,
        reports: Arc<ReportStore>,
        artifacts: ArtifactStore,
        logger: Logger,
    }

    fn fixture(behaviour: Behaviour) -> Fixture {
        let mut record = Record::new("BR001", 0, "https://example.org/doc.pdf");
        record.status = RecordStatus::Staged;
        let reports = Arc::new(ReportStore::new());
        reports.append(record.clone());
        let artifacts = ArtifactStore::in_memory("pdf");
        let logger = Logger::new(LogLevel::Trace);

        let task = DownloadTask::builder()
            .record(record)
            .fetcher(Arc::new(StubFetcher(behaviour)))
            .artifacts(artifacts.clone())
            .reports(reports.clone())
            .timeout(Duration::from_secs(1))
            .logger(logger.clone())
            .build();

        Fixture {
            task,
            reports,
            artifacts,
            logger,
        }
    }

    #[tokio::test]
    async fn test_success_stores_artifact() {
        let fx = fixture(Behaviour::Serve(b"%PDF-1.7"));
        fx.task.start().await;

        assert_eq!(fx.task.lifecycle(), Lifecycle::Done);
        assert_eq!(fx.reports.get(0).unwrap().status, RecordStatus::Fetched);
        assert_eq!(fx.task.read_result().status, RecordStatus::Fetched);
        assert!(fx.artifacts.exists("BR001").await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_marks_not_fetched_and_cleans_up() {
        let fx = fixture(Behaviour::Fail);
        // Leftover from an earlier interrupted attempt
        fx.artifacts
            .put("BR001", Bytes::from_static(b"partial"))
            .await
            .unwrap();

        fx.task.start().await;

        assert_eq!(fx.task.lifecycle(), Lifecycle::Error);
        assert_eq!(fx.reports.get(0).unwrap().status, RecordStatus::NotFetched);
        assert!(!fx.artifacts.exists("BR001").await.unwrap());
    }

    #[tokio::test]
    async fn test_panic_between_fetch_and_status_is_reported() {
        let fx = fixture(Behaviour::Panic);
        fx.task.start().await;

        assert_eq!(fx.task.lifecycle(), Lifecycle::Error);
        assert_eq!(fx.reports.get(0).unwrap().status, RecordStatus::NotFetched);
        assert!(fx.logger.queue().read().iter().any(|e| {
            e.severity == LogLevel::Error && e.message.starts_with("ProgrammingInvariantViolation")
        }));
    }

    #[tokio::test]
    async fn test_stop_interrupts_hanging_fetch() {
        let fx = Arc::new(fixture(Behaviour::Hang));
        let running = fx.clone();
        let handle = tokio::spawn(async move { running.task.start().await });

        while fx.task.lifecycle() != Lifecycle::Running {
            tokio::task::yield_now().await;
        }
        fx.task.stop();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(fx.task.lifecycle(), Lifecycle::Error);
        assert_eq!(fx.reports.get(0).unwrap().status, RecordStatus::NotFetched);
    }

    #[tokio::test]
    async fn test_stopped_before_start_releases_record() {
        let fx = fixture(Behaviour::Serve(b"unused"));
        fx.task.stop();
        fx.task.start().await;

        assert_eq!(fx.task.lifecycle(), Lifecycle::Done);
        assert_eq!(fx.reports.get(0).unwrap().status, RecordStatus::NotFetched);
        assert!(!fx.artifacts.exists("BR001").await.unwrap());
    }

    #[tokio::test]
    async fn test_unstaged_record_is_left_alone() {
        let reports = Arc::new(ReportStore::new());
        let record = Record::new("BR009", 0, "https://example.org/x.pdf");
        reports.append(record.clone());
        let task = DownloadTask::builder()
            .record(record)
            .fetcher(Arc::new(StubFetcher(Behaviour::Panic)))
            .artifacts(ArtifactStore::in_memory("pdf"))
            .reports(reports.clone())
            .timeout(Duration::from_secs(1))
            .logger(Logger::new(LogLevel::Trace))
            .build();

        task.start().await;

        assert_eq!(task.lifecycle(), Lifecycle::Done);
        assert_eq!(reports.get(0).unwrap().status, RecordStatus::Init);
    }
}
