//! HTTP client for downloading documents

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{FetchError, Fetcher, Result};
use crate::config::FetchConfig;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub max_redirects: usize,
    pub max_body_bytes: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("docpull/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 10,
            max_body_bytes: 100 * 1024 * 1024,
        }
    }
}

impl From<&FetchConfig> for HttpConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            user_agent: config.user_agent.clone(),
            max_redirects: config.max_redirects,
            max_body_bytes: config.max_artifact_bytes.as_u64(),
        }
    }
}

/// Single-attempt document downloader. The per-call timeout bounds the whole
/// request so a stalled peer cannot hold a worker slot indefinitely.
pub struct HttpFetcher {
    client: Client,
    config: HttpConfig,
}

impl HttpFetcher {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn check_size(&self, len: u64) -> Result<()> {
        if len > self.config.max_body_bytes {
            return Err(FetchError::TooLarge {
                limit: self.config.max_body_bytes,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Bytes> {
        debug!(url, "Starting download");

        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let response = self
            .client
            .get(parsed)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(timeout)
                } else if e.is_redirect() {
                    FetchError::TooManyRedirects
                } else {
                    FetchError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::RequestFailed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        if let Some(len) = response.content_length() {
            self.check_size(len)?;
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::RequestFailed(format!("Failed to read body: {}", e))
            }
        })?;
        // Chunked responses carry no content length
        self.check_size(bytes.len() as u64)?;

        debug!(url, size = bytes.len(), "Download completed");

        Ok(bytes)
    }
}
