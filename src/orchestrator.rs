//! Phase state machine driving a pipeline run
//!
//! The orchestrator owns the control state (phase, pending queue, interrupt flag)
//! and is the only thing that mutates it. It reacts to three events: a periodic
//! tick, a task completion signalled by the executor, and an interrupt from the
//! process signal boundary. After each event it re-evaluates the current phase.
//!
//! ```text
//! Initializing -> Read -> Download -> Write -> Shutdown
//!                   |        ^  |                 ^
//!                   |        +--+ refill          |
//!                   +-----------------------------+ (read failed / nothing to do)
//! ```

use bon::bon;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::Config;
use crate::error::PipelineError;
use crate::executor::Executor;
use crate::fetch::{Fetcher, HttpConfig, HttpFetcher};
use crate::logging::Logger;
use crate::manifest::{ManifestReader, SourceReader};
use crate::observability::{MetricsSnapshot, PipelineMetrics};
use crate::record::{Record, RecordStatus};
use crate::shared::ReportStore;
use crate::sink::ReportSink;
use crate::storage::ArtifactStore;
use crate::task::{
    DownloadTask, Lifecycle, LogDrain, LogFile, LogTask, PipelineTask, ReadTask, Task,
    TaskOutput, WriteTask,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Initializing,
    Read,
    Download,
    Write,
    Shutdown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a finished run looked like
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub fetched: usize,
    pub not_fetched: usize,
    pub interrupted: bool,
    /// Highest executor active count seen by the control loop, log task included
    pub peak_active: usize,
    pub phases: Vec<Phase>,
    pub metrics: MetricsSnapshot,
}

enum Event {
    Tick,
    Completed,
    Interrupt,
    SignalsClosed,
}

pub struct Orchestrator {
    run_id: Uuid,
    config: Config,
    logger: Logger,
    metrics: Arc<PipelineMetrics>,
    executor: Executor<PipelineTask>,
    reports: Arc<ReportStore>,
    reader: Arc<dyn SourceReader>,
    fetcher: Arc<dyn Fetcher>,
    artifacts: ArtifactStore,
    sink: ReportSink,
    log_drain: Arc<LogDrain>,

    phase: Phase,
    phases: Vec<Phase>,
    read_task: Option<Arc<PipelineTask>>,
    pending: VecDeque<Record>,
    download_total: usize,
    dispatched: usize,
    interrupted: bool,
    peak_active: usize,
    failure: Option<PipelineError>,
}

#[bon]
impl Orchestrator {
    #[builder]
    pub fn new(
        config: Config,
        reader: Arc<dyn SourceReader>,
        fetcher: Arc<dyn Fetcher>,
        artifacts: ArtifactStore,
        logger: Logger,
        log_file: Option<LogFile>,
        #[builder(default)] metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let executor = Executor::new(config.pipeline.concurrency, logger.clone(), metrics.clone())
            .with_drain_poll(config.pipeline.drain_poll());
        let sink = ReportSink::new(
            config.output.report_path.clone(),
            config.manifest.delimiter_byte(),
        );
        let log_drain = Arc::new(LogDrain::new(logger.queue(), log_file));

        Self {
            run_id: Uuid::now_v7(),
            config,
            logger,
            metrics,
            executor,
            reports: Arc::new(ReportStore::new()),
            reader,
            fetcher,
            artifacts,
            sink,
            log_drain,
            phase: Phase::Initializing,
            phases: vec![Phase::Initializing],
            read_task: None,
            pending: VecDeque::new(),
            download_total: 0,
            dispatched: 0,
            interrupted: false,
            peak_active: 0,
            failure: None,
        }
    }
}

impl Orchestrator {
    /// Wire up the production collaborators: CSV/JSON manifest reader, reqwest
    /// fetcher, local artifact directory and optional log file.
    pub fn from_config(config: Config, logger: Logger) -> Result<Self, PipelineError> {
        let reader = Arc::new(ManifestReader::from_config(&config.manifest));
        let fetcher = Arc::new(HttpFetcher::new(HttpConfig::from(&config.fetch))?);
        let artifacts = ArtifactStore::local(
            &config.output.artifact_dir,
            config.output.artifact_extension.clone(),
        )?;
        let log_file = config.logging.file.clone().map(LogFile::new);

        Ok(Self::builder()
            .config(config)
            .reader(reader)
            .fetcher(fetcher)
            .artifacts(artifacts)
            .logger(logger)
            .maybe_log_file(log_file)
            .build())
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase entered so far, in order
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn reports(&self) -> Arc<ReportStore> {
        self.reports.clone()
    }

    /// Drive the pipeline until Shutdown. Each message on `interrupts` is one
    /// termination signal; only the first one has an effect.
    pub async fn run(
        &mut self,
        mut interrupts: mpsc::Receiver<()>,
    ) -> Result<RunSummary, PipelineError> {
        self.banner();

        let log_task = LogTask::new(self.log_drain.clone(), self.config.logging.idle_sleep());
        self.executor.submit(Arc::new(PipelineTask::Log(log_task)));

        let read_task = Arc::new(PipelineTask::Read(
            ReadTask::builder()
                .manifest(self.config.manifest.path.clone())
                .reader(self.reader.clone())
                .reports(self.reports.clone())
                .artifacts(self.artifacts.clone())
                .existing(self.config.output.existing_artifacts)
                .logger(self.logger.clone())
                .build(),
        ));
        if self.executor.submit(read_task.clone()) {
            self.read_task = Some(read_task);
            self.enter(Phase::Read);
        } else {
            self.failure = Some(self.logger.fatal("Could not schedule the manifest reader").into());
            self.enter(Phase::Shutdown);
        }

        let completed = self.executor.completion_signal();
        let mut ticker = tokio::time::interval(self.config.pipeline.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut listening = true;

        while self.phase != Phase::Shutdown {
            self.observe_active();

            let event = tokio::select! {
                _ = ticker.tick() => Event::Tick,
                _ = completed.notified() => Event::Completed,
                signal = interrupts.recv(), if listening => match signal {
                    Some(()) => Event::Interrupt,
                    None => Event::SignalsClosed,
                },
            };

            match event {
                Event::Interrupt => self.on_interrupt().await,
                Event::SignalsClosed => listening = false,
                Event::Tick | Event::Completed => {}
            }

            self.observe_active();
            self.step();
        }

        let summary = self.summary();
        self.logger.info(format!(
            "Finished run {}: {} records, {} fetched, {} not fetched{}",
            summary.run_id,
            summary.total,
            summary.fetched,
            summary.not_fetched,
            if summary.interrupted { " (interrupted)" } else { "" }
        ));

        self.executor.drain_all().await;
        // Completion hooks may have logged after the log task's final drain
        self.log_drain.flush().await;

        match self.failure.take() {
            Some(e) => Err(e),
            None => Ok(RunSummary {
                metrics: self.metrics.snapshot(),
                ..summary
            }),
        }
    }

    fn banner(&self) {
        let config = &self.config;
        self.logger.info(format!(
            "docpull run {} starting: manifest={}, report={}, artifacts={}, concurrency={}",
            self.run_id,
            config.manifest.path.display(),
            config.output.report_path.display(),
            config.output.artifact_dir.display(),
            config.pipeline.concurrency
        ));
        self.logger.trace(format!(
            "fetch timeout={}s, existing artifacts={:?}, max artifact size={}",
            config.fetch.timeout_secs,
            config.output.existing_artifacts,
            config.fetch.max_artifact_bytes
        ));
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        self.logger.trace(format!("Phase {} -> {}", self.phase, phase));
        self.phase = phase;
        self.phases.push(phase);
    }

    fn observe_active(&mut self) {
        self.peak_active = self.peak_active.max(self.executor.active_count());
    }

    fn step(&mut self) {
        match self.phase {
            Phase::Initializing | Phase::Shutdown => {}
            Phase::Read => self.step_read(),
            Phase::Download => self.refill(),
            Phase::Write => {
                if self.executor.active_one_shot_count() == 0 {
                    self.enter(Phase::Shutdown);
                }
            }
        }
    }

    fn step_read(&mut self) {
        let Some(read_task) = self.read_task.clone() else {
            return;
        };

        match read_task.lifecycle() {
            // Done is set before the completion hook releases the reader's slot
            Lifecycle::Done if self.executor.active_one_shot_count() > 0 => {}
            Lifecycle::Done => {
                let records = self.reports.read();
                self.pending = records
                    .iter()
                    .filter(|r| r.status == RecordStatus::Init)
                    .cloned()
                    .collect();
                self.download_total = self.pending.len();

                if !self.pending.is_empty() {
                    self.enter(Phase::Download);
                    self.refill();
                } else if !records.is_empty() {
                    self.logger.info("Nothing to download, writing report");
                    self.begin_write();
                } else {
                    self.logger.warn(format!(
                        "Manifest {} has no rows",
                        self.config.manifest.path.display()
                    ));
                    self.enter(Phase::Shutdown);
                }
            }
            Lifecycle::Error => {
                let cause = match read_task.read_result() {
                    TaskOutput::Read(outcome) => outcome.failure,
                    _ => None,
                }
                .unwrap_or_else(|| "reader task failed".to_string());

                let fatal = self.logger.fatal(format!(
                    "Could not read manifest {}: {}",
                    self.config.manifest.path.display(),
                    cause
                ));
                self.failure = Some(PipelineError::SourceRead(fatal));
                self.enter(Phase::Shutdown);
            }
            Lifecycle::Idle | Lifecycle::Running => {}
        }
    }

    /// Top the pool back up to the budget, then move on once nothing is pending
    /// or in flight
    fn refill(&mut self) {
        while self.executor.active_one_shot_count() < self.executor.budget() {
            let Some(mut record) = self.pending.pop_front() else {
                break;
            };

            record.status = RecordStatus::Staged;
            self.reports.set_status(record.row_index, RecordStatus::Staged);
            self.dispatched += 1;
            self.logger.info(format!(
                "Downloading: {} ({}/{})",
                self.artifacts.artifact_name(&record.business_key),
                self.dispatched,
                self.download_total
            ));

            let row_index = record.row_index;
            let task = DownloadTask::builder()
                .record(record)
                .fetcher(self.fetcher.clone())
                .artifacts(self.artifacts.clone())
                .reports(self.reports.clone())
                .timeout(self.config.fetch.timeout())
                .logger(self.logger.clone())
                .metrics(self.metrics.clone())
                .build();

            if !self.executor.submit(Arc::new(PipelineTask::Download(task))) {
                self.reports.set_status(row_index, RecordStatus::NotFetched);
            }
        }

        if self.pending.is_empty() && self.executor.active_one_shot_count() == 0 {
            self.begin_write();
        }
    }

    fn begin_write(&mut self) {
        for record in self.reports.read() {
            match record.status {
                RecordStatus::Init => {
                    self.logger.warn(format!(
                        "{} was never downloaded, recording NotFetched",
                        record.business_key
                    ));
                    self.reports
                        .set_status(record.row_index, RecordStatus::NotFetched);
                }
                RecordStatus::Staged => {
                    self.logger.error(format!(
                        "ProgrammingInvariantViolation: {} still Staged with no download in flight",
                        record.business_key
                    ));
                    self.reports
                        .set_status(record.row_index, RecordStatus::NotFetched);
                }
                RecordStatus::Fetched | RecordStatus::NotFetched => {}
            }
        }

        let task = WriteTask::new(self.reports.clone(), self.sink.clone(), self.logger.clone());
        if !self.executor.submit(Arc::new(PipelineTask::Write(task))) {
            self.logger.error(format!(
                "Could not schedule report write to {}",
                self.sink.path().display()
            ));
        }
        self.enter(Phase::Write);
    }

    async fn on_interrupt(&mut self) {
        if self.interrupted {
            self.logger
                .trace("Interrupt ignored, shutdown already in progress");
            return;
        }
        self.interrupted = true;

        if self.phase != Phase::Download {
            self.logger
                .warn(format!("Interrupted during {}, shutting down", self.phase));
            self.enter(Phase::Shutdown);
            return;
        }

        self.logger.warn(format!(
            "Interrupted, stopping downloads ({} not started)",
            self.pending.len()
        ));
        for task in self.executor.running_tasks_snapshot() {
            if !task.is_continuous() {
                self.executor.request_stop(&task);
            }
        }
        self.pending.clear();
        self.executor.wait_for_one_shots().await;
        self.observe_active();
        self.begin_write();
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            total: self.reports.count(),
            fetched: self.reports.count_status(RecordStatus::Fetched),
            not_fetched: self.reports.count_status(RecordStatus::NotFetched),
            interrupted: self.interrupted,
            peak_active: self.peak_active,
            phases: self.phases.clone(),
            metrics: self.metrics.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{self, FetchError};
    use crate::logging::LogLevel;
    use crate::manifest::{ManifestRow, SourceReadError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Rows(Vec<ManifestRow>);

    #[async_trait]
    impl SourceReader for Rows {
        async fn parse_rows(&self, _path: &Path) -> Result<Vec<ManifestRow>, SourceReadError> {
            Ok(self.0.clone())
        }
    }

    struct EchoFetcher;

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> fetch::Result<Bytes> {
            if url.contains("missing") {
                return Err(FetchError::RequestFailed("404 Not Found".to_string()));
            }
            Ok(Bytes::from(url.to_string()))
        }
    }

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.pipeline.concurrency = 2;
        config.pipeline.tick_interval_ms = 5;
        config.pipeline.drain_poll_ms = 5;
        config.logging.idle_sleep_ms = 5;
        config.manifest.path = PathBuf::from("manifest.csv");
        config.output.report_path = dir.path().join("report.csv");
        config
    }

    fn orchestrator(config: Config, rows: Vec<ManifestRow>) -> Orchestrator {
        Orchestrator::builder()
            .config(config)
            .reader(Arc::new(Rows(rows)))
            .fetcher(Arc::new(EchoFetcher))
            .artifacts(ArtifactStore::in_memory("pdf"))
            .logger(Logger::new(LogLevel::Trace))
            .build()
    }

    #[tokio::test]
    async fn test_full_run_visits_every_phase() {
        let dir = TempDir::new().unwrap();
        let rows = vec![
            ManifestRow::new("BR001", "https://example.org/a.pdf"),
            ManifestRow::new("BR002", "https://example.org/missing.pdf"),
            ManifestRow::new("BR003", "nope"),
        ];
        let mut orch = orchestrator(config(&dir), rows);
        let (_tx, rx) = mpsc::channel(1);

        let summary = orch.run(rx).await.unwrap();

        assert_eq!(
            summary.phases,
            vec![
                Phase::Initializing,
                Phase::Read,
                Phase::Download,
                Phase::Write,
                Phase::Shutdown
            ]
        );
        assert_eq!(summary.total, 3);
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.not_fetched, 2);
        assert!(!summary.interrupted);
        assert!(summary.peak_active <= 3);
        assert_eq!(summary.metrics.documents_fetched, 1);

        let report = std::fs::read_to_string(dir.path().join("report.csv")).unwrap();
        assert_eq!(report.lines().count(), 4);
    }

    #[tokio::test]
    async fn test_nothing_pending_goes_straight_to_write() {
        let dir = TempDir::new().unwrap();
        let rows = vec![ManifestRow::new("BR001", "invalid-url")];
        let mut orch = orchestrator(config(&dir), rows);
        let (_tx, rx) = mpsc::channel(1);

        let summary = orch.run(rx).await.unwrap();

        assert!(!summary.phases.contains(&Phase::Download));
        assert!(summary.phases.contains(&Phase::Write));
        let report = std::fs::read_to_string(dir.path().join("report.csv")).unwrap();
        assert!(report.contains("BR001,NotFetched,0,none"));
    }

    #[tokio::test]
    async fn test_empty_manifest_shuts_down_without_report() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(config(&dir), Vec::new());
        let (_tx, rx) = mpsc::channel(1);

        let summary = orch.run(rx).await.unwrap();

        assert_eq!(
            summary.phases,
            vec![Phase::Initializing, Phase::Read, Phase::Shutdown]
        );
        assert!(!dir.path().join("report.csv").exists());
    }

    #[tokio::test]
    async fn test_read_phase_waits_for_reader_slot_release() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(config(&dir), Vec::new());

        // A finished reader that the executor still counts as active
        let reader = Arc::new(PipelineTask::Read(
            ReadTask::builder()
                .manifest(PathBuf::from("manifest.csv"))
                .reader(Arc::new(Rows(Vec::new())))
                .reports(orch.reports())
                .artifacts(ArtifactStore::in_memory("pdf"))
                .logger(Logger::new(LogLevel::Trace))
                .build(),
        ));
        reader.stop();
        assert_eq!(reader.lifecycle(), Lifecycle::Done);
        assert!(orch.executor.submit(reader.clone()));
        orch.read_task = Some(reader);
        orch.enter(Phase::Read);

        orch.step_read();
        assert_eq!(orch.phase(), Phase::Read);
        assert_eq!(orch.executor.active_one_shot_count(), 1);

        orch.executor.wait_for_one_shots().await;
        orch.step_read();
        assert_eq!(orch.phase(), Phase::Shutdown);
        assert!(orch.executor.active_count() <= 1);
    }

    #[tokio::test]
    async fn test_closed_signal_channel_is_not_an_interrupt() {
        let dir = TempDir::new().unwrap();
        let rows = vec![ManifestRow::new("BR001", "https://example.org/a.pdf")];
        let mut orch = orchestrator(config(&dir), rows);
        let (tx, rx) = mpsc::channel(1);
        drop(tx);

        let summary = orch.run(rx).await.unwrap();

        assert!(!summary.interrupted);
        assert_eq!(summary.fetched, 1);
    }
}
