//! Wall-clock duration measurement for task runs

use std::time::{Duration, Instant};

/// Measures the span between `start` and `stop`
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    started: Option<Instant>,
    stopped: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.stopped = None;
    }

    /// Stopping twice keeps the first stop instant
    pub fn stop(&mut self) {
        if self.started.is_some() && self.stopped.is_none() {
            self.stopped = Some(Instant::now());
        }
    }

    /// Elapsed time; a running timer reports time until now, an unstarted one zero
    pub fn duration(&self) -> Duration {
        match (self.started, self.stopped) {
            (Some(start), Some(stop)) => stop.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration().as_secs_f64() * 1000.0
    }
}
