//! Pipeline logger
//!
//! Components never print directly. They hold a cloned [`Logger`] which filters by
//! level and pushes [`LogEntry`] values onto the shared [`LogQueue`]; the log task
//! drains that queue into `tracing` and the optional log file.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::shared::LogQueue;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(severity: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}]:{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.severity,
            self.message
        )
    }
}

/// Raised by [`Logger::fatal`] after the entry has been queued
#[derive(Debug, Clone, Error)]
#[error("fatal: {0}")]
pub struct FatalError(pub String);

/// Level-filtering front end of the log queue
#[derive(Debug, Clone)]
pub struct Logger {
    queue: Arc<LogQueue>,
    level: LogLevel,
}

impl Logger {
    pub fn new(level: LogLevel) -> Self {
        Self::with_queue(Arc::new(LogQueue::new()), level)
    }

    pub fn with_queue(queue: Arc<LogQueue>, level: LogLevel) -> Self {
        Self { queue, level }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn queue(&self) -> Arc<LogQueue> {
        self.queue.clone()
    }

    pub fn enabled(&self, severity: LogLevel) -> bool {
        severity >= self.level
    }

    pub fn log(&self, severity: LogLevel, message: impl Into<String>) {
        if self.enabled(severity) {
            self.queue.push(LogEntry::new(severity, message));
        }
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(LogLevel::Trace, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Always recorded regardless of level. The returned error is meant to be
    /// propagated so the caller terminates.
    #[must_use]
    pub fn fatal(&self, message: impl Into<String>) -> FatalError {
        let message = message.into();
        self.queue.push(LogEntry::new(LogLevel::Fatal, message.clone()));
        FatalError(message)
    }
}
