//! Remote document fetching
//!
//! Download tasks only see the [`Fetcher`] trait; [`HttpFetcher`] is the reqwest
//! implementation used by the binary.

pub mod http;

pub use http::{HttpConfig, HttpFetcher};

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("Response body exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Fetches one document body, giving up after `timeout`
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Bytes>;
}
