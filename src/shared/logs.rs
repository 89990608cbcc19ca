use std::collections::VecDeque;
use std::sync::Mutex;

use super::guard;
use crate::logging::LogEntry;

/// FIFO of pending log entries, consumed destructively only by the log task
#[derive(Debug, Default)]
pub struct LogQueue {
    entries: Mutex<VecDeque<LogEntry>>,
}

impl LogQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: LogEntry) {
        guard(&self.entries).push_back(entry);
    }

    /// Copy of the queued entries, oldest first
    pub fn read(&self) -> Vec<LogEntry> {
        guard(&self.entries).iter().cloned().collect()
    }

    pub fn count(&self) -> usize {
        guard(&self.entries).len()
    }

    pub fn pop_oldest(&self) -> Option<LogEntry> {
        guard(&self.entries).pop_front()
    }
}
