//! Delimited report output
//!
//! The report is opened in append mode. The header row is written only when the
//! file is empty at open time, so repeated runs against one report file keep a
//! single header.

use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::record::Record;

pub const REPORT_HEADER: [&str; 4] = ["BusinessKey", "Status", "RowIndex", "URL"];

#[derive(Debug, Error)]
pub enum SinkWriteError {
    #[error("Failed to open report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode report row: {0}")]
    Encode(#[from] csv::Error),

    #[error("Report writer aborted: {0}")]
    Aborted(String),
}

#[derive(Serialize)]
struct ReportRow<'a> {
    business_key: &'a str,
    status: &'a str,
    row_index: usize,
    url: &'a str,
}

/// Outcome of one flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkSummary {
    pub rows: usize,
    pub wrote_header: bool,
}

#[derive(Debug, Clone)]
pub struct ReportSink {
    path: PathBuf,
    delimiter: u8,
}

impl ReportSink {
    pub fn new(path: impl Into<PathBuf>, delimiter: u8) -> Self {
        Self {
            path: path.into(),
            delimiter,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append every record in row order. Runs on the blocking pool.
    pub async fn write_all(&self, mut records: Vec<Record>) -> Result<SinkSummary, SinkWriteError> {
        records.sort_by_key(|r| r.row_index);
        let sink = self.clone();

        tokio::task::spawn_blocking(move || sink.write_blocking(&records))
            .await
            .map_err(|e| SinkWriteError::Aborted(e.to_string()))?
    }

    fn write_blocking(&self, records: &[Record]) -> Result<SinkSummary, SinkWriteError> {
        let io_err = |source| SinkWriteError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        let wrote_header = file.metadata().map_err(io_err)?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .from_writer(file);

        if wrote_header {
            writer.write_record(REPORT_HEADER)?;
        }
        for record in records {
            writer.serialize(ReportRow {
                business_key: &record.business_key,
                status: record.status.as_str(),
                row_index: record.row_index,
                url: &record.url,
            })?;
        }
        writer.flush().map_err(io_err)?;

        Ok(SinkSummary {
            rows: records.len(),
            wrote_header,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{NO_URL, RecordStatus};
    use tempfile::TempDir;

    fn fetched(key: &str, row: usize) -> Record {
        let mut record = Record::new(key, row, format!("https://example.org/{key}.pdf"));
        record.status = RecordStatus::Fetched;
        record
    }

    #[tokio::test]
    async fn test_header_written_once_across_flushes() {
        let dir = TempDir::new().unwrap();
        let sink = ReportSink::new(dir.path().join("out/report.csv"), b',');

        let first = sink.write_all(vec![fetched("A", 0)]).await.unwrap();
        let second = sink.write_all(vec![fetched("B", 0)]).await.unwrap();
        assert!(first.wrote_header);
        assert!(!second.wrote_header);

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "BusinessKey,Status,RowIndex,URL");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.iter().filter(|l| l.starts_with("BusinessKey")).count(), 1);
    }

    #[tokio::test]
    async fn test_rows_follow_manifest_order() {
        let dir = TempDir::new().unwrap();
        let sink = ReportSink::new(dir.path().join("report.csv"), b',');
        let mut missing = Record::new("C", 1, NO_URL);
        missing.status = RecordStatus::NotFetched;

        let summary = sink
            .write_all(vec![fetched("D", 2), missing, fetched("A", 0)])
            .await
            .unwrap();
        assert_eq!(summary.rows, 3);

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = text.lines().skip(1).collect();
        assert_eq!(lines[0], "A,Fetched,0,https://example.org/A.pdf");
        assert_eq!(lines[1], "C,NotFetched,1,none");
        assert!(lines[2].starts_with("D,Fetched,2,"));
    }

    #[tokio::test]
    async fn test_unwritable_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened as the report file
        let sink = ReportSink::new(dir.path(), b',');
        let err = sink.write_all(vec![fetched("A", 0)]).await.unwrap_err();
        assert!(matches!(err, SinkWriteError::Io { .. }));
    }
}
