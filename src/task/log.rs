//! Continuous log drain
//!
//! The log task is the only consumer of the [`LogQueue`]. It forwards each entry to
//! `tracing` and, when configured, appends it to a log file. It keeps running until
//! the executor raises its stop signal, then drains whatever is left once more.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{Task, TaskCore};
use crate::logging::{LogEntry, LogLevel};
use crate::shared::LogQueue;

/// Append-only log file, opened on first write
#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    file: tokio::sync::Mutex<Option<File>>,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: tokio::sync::Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, entries: &[LogEntry]) -> std::io::Result<()> {
        let mut slot = self.file.lock().await;
        if slot.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let opened = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *slot = Some(opened);
        }

        if let Some(file) = slot.as_mut() {
            let mut buf = String::new();
            for entry in entries {
                buf.push_str(&entry.to_string());
                buf.push('\n');
            }
            file.write_all(buf.as_bytes()).await?;
            file.flush().await?;
        }
        Ok(())
    }
}

/// Moves queued entries to their outputs. Shared by the log task and the final
/// flush at shutdown.
#[derive(Debug)]
pub struct LogDrain {
    queue: Arc<LogQueue>,
    file: Option<LogFile>,
}

impl LogDrain {
    pub fn new(queue: Arc<LogQueue>, file: Option<LogFile>) -> Self {
        Self { queue, file }
    }

    /// Emit everything queued right now. Returns how many entries were taken.
    pub async fn flush(&self) -> usize {
        let mut entries = Vec::new();
        while let Some(entry) = self.queue.pop_oldest() {
            entries.push(entry);
        }
        if entries.is_empty() {
            return 0;
        }

        for entry in &entries {
            emit(entry);
        }

        if let Some(file) = &self.file {
            if let Err(e) = file.append(&entries).await {
                tracing::error!(
                    path = %file.path().display(),
                    error = %e,
                    "Failed to append to log file"
                );
            }
        }

        entries.len()
    }
}

fn emit(entry: &LogEntry) {
    let ts = entry.timestamp.to_rfc3339();
    match entry.severity {
        LogLevel::Trace => tracing::trace!(at = %ts, "{}", entry.message),
        LogLevel::Info => tracing::info!(at = %ts, "{}", entry.message),
        LogLevel::Warn => tracing::warn!(at = %ts, "{}", entry.message),
        LogLevel::Error => tracing::error!(at = %ts, "{}", entry.message),
        LogLevel::Fatal => tracing::error!(at = %ts, fatal = true, "{}", entry.message),
    }
}

pub struct LogTask {
    core: TaskCore,
    drain: Arc<LogDrain>,
    idle: Duration,
    written: AtomicUsize,
}

impl LogTask {
    pub fn new(drain: Arc<LogDrain>, idle: Duration) -> Self {
        Self {
            core: TaskCore::continuous("Logger"),
            drain,
            idle,
            written: AtomicUsize::new(0),
        }
    }

    async fn drain_once(&self) -> usize {
        let n = self.drain.flush().await;
        self.written.fetch_add(n, Ordering::Relaxed);
        n
    }
}

#[async_trait]
impl Task for LogTask {
    type Output = usize;

    fn core(&self) -> &TaskCore {
        &self.core
    }

    async fn start(&self) {
        if !self.core.begin() {
            self.drain_once().await;
            return;
        }

        let mut stop = self.core.stop_signal();
        while !stop.is_raised() {
            if self.drain_once().await == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.idle) => {}
                    _ = stop.raised() => {}
                }
            }
        }

        self.drain_once().await;
        self.core.finish();
    }

    fn read_result(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }
}
