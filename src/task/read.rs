//! Manifest read task

use async_trait::async_trait;
use bon::bon;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::{Task, TaskCore};
use crate::config::ExistingArtifactPolicy;
use crate::logging::Logger;
use crate::manifest::{ManifestRow, SourceReadError, SourceReader};
use crate::record::{NO_URL, Record, RecordStatus};
use crate::shared::{ReportStore, guard};
use crate::storage::ArtifactStore;

/// A usable document URL is non-empty, absolute and http(s)
pub fn validate_url(url: &str) -> bool {
    if url.trim().is_empty() {
        return false;
    }
    match reqwest::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.has_host(),
        Err(_) => false,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Records appended to the report store
    pub rows: usize,
    pub failure: Option<String>,
}

/// Parses the manifest and seeds the report store, one record per row
pub struct ReadTask {
    core: TaskCore,
    manifest: PathBuf,
    reader: Arc<dyn SourceReader>,
    reports: Arc<ReportStore>,
    artifacts: ArtifactStore,
    existing: ExistingArtifactPolicy,
    logger: Logger,
    outcome: Mutex<ReadOutcome>,
}

#[bon]
impl ReadTask {
    #[builder]
    pub fn new(
        manifest: PathBuf,
        reader: Arc<dyn SourceReader>,
        reports: Arc<ReportStore>,
        artifacts: ArtifactStore,
        #[builder(default)] existing: ExistingArtifactPolicy,
        logger: Logger,
    ) -> Self {
        Self {
            core: TaskCore::one_shot("FileReader"),
            manifest,
            reader,
            reports,
            artifacts,
            existing,
            logger,
            outcome: Mutex::new(ReadOutcome::default()),
        }
    }
}

impl ReadTask {
    async fn load(&self) -> Result<usize, SourceReadError> {
        // Parse everything first so a malformed manifest produces no records
        let rows = self.reader.parse_rows(&self.manifest).await?;
        let mut seen = HashSet::with_capacity(rows.len());

        for (row_index, row) in rows.into_iter().enumerate() {
            let record = self.to_record(row_index, row, &mut seen).await;
            self.logger.trace(format!(
                "Read entry: {} - {}",
                record.business_key, record.url
            ));
            self.reports.append(record);
        }

        Ok(self.reports.count())
    }

    async fn to_record(
        &self,
        row_index: usize,
        row: ManifestRow,
        seen: &mut HashSet<String>,
    ) -> Record {
        let ManifestRow { business_key, url } = row;

        if !validate_url(&url) {
            let mut record = Record::new(business_key, row_index, NO_URL);
            record.status = RecordStatus::NotFetched;
            return record;
        }

        let mut record = Record::new(business_key, row_index, url);
        if record.business_key.is_empty() {
            self.logger
                .warn(format!("Row {row_index} has no business key, skipping"));
            record.status = RecordStatus::NotFetched;
            return record;
        }
        // Keys that sanitise to the same file name would share one artifact
        if !seen.insert(self.artifacts.artifact_name(&record.business_key)) {
            self.logger.warn(format!(
                "Row {row_index} business key {} collides with an earlier row's artifact {}, skipping",
                record.business_key,
                self.artifacts.artifact_name(&record.business_key)
            ));
            record.status = RecordStatus::NotFetched;
            return record;
        }

        if self.existing == ExistingArtifactPolicy::Skip {
            match self.artifacts.exists(&record.business_key).await {
                Ok(true) => {
                    self.logger.trace(format!(
                        "{} already present, not downloading again",
                        self.artifacts.display_path(&record.business_key)
                    ));
                    record.status = RecordStatus::Fetched;
                }
                Ok(false) => {}
                Err(e) => self.logger.warn(format!(
                    "Could not check for existing artifact {}: {}",
                    record.business_key, e
                )),
            }
        }

        record
    }
}

#[async_trait]
impl Task for ReadTask {
    type Output = ReadOutcome;

    fn core(&self) -> &TaskCore {
        &self.core
    }

    async fn start(&self) {
        if !self.core.begin() {
            return;
        }

        match self.load().await {
            Ok(rows) => {
                guard(&self.outcome).rows = rows;
                self.logger.info(format!(
                    "Read {} entries from {}",
                    rows,
                    self.manifest.display()
                ));
                self.stop();
            }
            Err(e) => {
                self.logger.error(format!(
                    "Exception: {}, on file read {}",
                    e,
                    self.manifest.display()
                ));
                guard(&self.outcome).failure = Some(e.to_string());
                self.core.fail();
            }
        }
    }

    fn read_result(&self) -> ReadOutcome {
        guard(&self.outcome).clone()
    }
}
