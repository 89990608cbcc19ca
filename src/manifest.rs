//! Manifest source reader
//!
//! Turns a manifest file into `(business key, url)` rows. Delimited files are the
//! default; a `.json` path is read as an array of objects keyed by column name.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ManifestConfig;

#[derive(Debug, Error)]
pub enum SourceReadError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed delimited manifest: {0}")]
    Delimited(#[from] csv::Error),

    #[error("Malformed JSON manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Manifest is missing column '{0}'")]
    MissingColumn(String),

    #[error("Invalid manifest: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub business_key: String,
    pub url: String,
}

impl ManifestRow {
    pub fn new(business_key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            business_key: business_key.into(),
            url: url.into(),
        }
    }
}

/// Parses a manifest into rows, in file order
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn parse_rows(&self, path: &Path) -> Result<Vec<ManifestRow>, SourceReadError>;
}

/// Reads delimited or JSON manifests using the configured column names
#[derive(Debug, Clone)]
pub struct ManifestReader {
    key_column: String,
    url_column: String,
    delimiter: u8,
}

impl ManifestReader {
    pub fn new(key_column: impl Into<String>, url_column: impl Into<String>, delimiter: u8) -> Self {
        Self {
            key_column: key_column.into(),
            url_column: url_column.into(),
            delimiter,
        }
    }

    pub fn from_config(config: &ManifestConfig) -> Self {
        Self::new(
            config.key_column.clone(),
            config.url_column.clone(),
            config.delimiter_byte(),
        )
    }

    pub fn parse_delimited(&self, data: &[u8]) -> Result<Vec<ManifestRow>, SourceReadError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(data);

        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| SourceReadError::MissingColumn(name.to_string()))
        };
        let key_idx = column(&self.key_column)?;
        let url_idx = column(&self.url_column)?;

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            // Blank lines come through as a single empty field
            if record.iter().all(str::is_empty) {
                continue;
            }
            rows.push(ManifestRow::new(
                record.get(key_idx).unwrap_or_default(),
                record.get(url_idx).unwrap_or_default(),
            ));
        }
        Ok(rows)
    }

    pub fn parse_json(&self, data: &[u8]) -> Result<Vec<ManifestRow>, SourceReadError> {
        let Value::Array(items) = serde_json::from_slice::<Value>(data)? else {
            return Err(SourceReadError::Invalid(
                "expected a JSON array of objects".to_string(),
            ));
        };

        items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let Value::Object(fields) = item else {
                    return Err(SourceReadError::Invalid(format!("row {idx} is not an object")));
                };
                let key = fields
                    .get(&self.key_column)
                    .ok_or_else(|| SourceReadError::MissingColumn(self.key_column.clone()))?;
                let url = fields.get(&self.url_column).unwrap_or(&Value::Null);
                Ok(ManifestRow::new(cell_text(key), cell_text(url)))
            })
            .collect()
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

#[async_trait]
impl SourceReader for ManifestReader {
    async fn parse_rows(&self, path: &Path) -> Result<Vec<ManifestRow>, SourceReadError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| SourceReadError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if is_json(path) {
            self.parse_json(&data)
        } else {
            self.parse_delimited(&data)
        }
    }
}
