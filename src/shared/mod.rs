//! Mutex-guarded containers shared between tasks
//!
//! These are the only channel through which report and log data cross task
//! boundaries. Every operation holds the lock for its whole duration, does no I/O
//! while holding it, and every read hands back an owned copy so callers never
//! iterate over data another worker may be mutating.

mod logs;
mod reports;

pub use logs::LogQueue;
pub use reports::ReportStore;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// A panicking writer cannot leave these containers half-updated (each operation is a
/// single push/pop/assign), so a poisoned lock is still safe to use.
pub(crate) fn guard<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}
