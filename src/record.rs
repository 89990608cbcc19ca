//! Per-row fetch outcome tracked across the pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stored in place of a URL that failed validation
pub const NO_URL: &str = "none";

/// Fetch status of one manifest row
///
/// `Init -> Staged -> {Fetched | NotFetched}`. Rows with an invalid URL go straight
/// from `Init` to `NotFetched` while the manifest is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    Init,
    Staged,
    Fetched,
    NotFetched,
}

impl RecordStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RecordStatus::Fetched | RecordStatus::NotFetched)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Init => "Init",
            RecordStatus::Staged => "Staged",
            RecordStatus::Fetched => "Fetched",
            RecordStatus::NotFetched => "NotFetched",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub business_key: String,
    pub row_index: usize,
    pub url: String,
    pub status: RecordStatus,
}

impl Record {
    pub fn new(business_key: impl Into<String>, row_index: usize, url: impl Into<String>) -> Self {
        Self {
            business_key: business_key.into(),
            row_index,
            url: url.into(),
            status: RecordStatus::Init,
        }
    }

    pub fn has_url(&self) -> bool {
        self.url != NO_URL
    }
}
