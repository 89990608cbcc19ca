use std::sync::Mutex;

use super::guard;
use crate::record::{Record, RecordStatus};

/// Ordered report records, append-only while reading the manifest and mutated in
/// place (one owning task per record) afterwards
#[derive(Debug, Default)]
pub struct ReportStore {
    records: Mutex<Vec<Record>>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: Record) {
        guard(&self.records).push(record);
    }

    /// Independent copy of every record in row order
    pub fn read(&self) -> Vec<Record> {
        guard(&self.records).clone()
    }

    pub fn count(&self) -> usize {
        guard(&self.records).len()
    }

    pub fn get(&self, row_index: usize) -> Option<Record> {
        let records = guard(&self.records);
        locate(&records, row_index).map(|pos| records[pos].clone())
    }

    /// Replace the stored record sharing `record.row_index`; false if no such row
    pub fn write(&self, record: Record) -> bool {
        let mut records = guard(&self.records);
        match locate(&records, record.row_index) {
            Some(pos) => {
                records[pos] = record;
                true
            }
            None => false,
        }
    }

    /// Set the status of one row, returning the status it replaced
    pub fn set_status(&self, row_index: usize, status: RecordStatus) -> Option<RecordStatus> {
        let mut records = guard(&self.records);
        let pos = locate(&records, row_index)?;
        Some(std::mem::replace(&mut records[pos].status, status))
    }

    /// Number of records currently holding `status`
    pub fn count_status(&self, status: RecordStatus) -> usize {
        guard(&self.records)
            .iter()
            .filter(|r| r.status == status)
            .count()
    }
}

// Rows are appended in manifest order so the position usually equals the row index.
fn locate(records: &[Record], row_index: usize) -> Option<usize> {
    match records.get(row_index) {
        Some(r) if r.row_index == row_index => Some(row_index),
        _ => records.iter().position(|r| r.row_index == row_index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn record(key: &str, row: usize) -> Record {
        Record::new(key, row, format!("https://example.org/{key}.pdf"))
    }

    #[test]
    fn test_read_returns_detached_copy() {
        let store = ReportStore::new();
        store.append(record("a", 0));

        let mut snapshot = store.read();
        snapshot[0].status = RecordStatus::Fetched;
        store.append(record("b", 1));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.get(0).unwrap().status, RecordStatus::Init);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_concurrent_appends_are_all_kept() {
        let store = Arc::new(ReportStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        store.append(record("k", t * 100 + i));
                    }
                })
            })
            .collect();

        let early = store.read();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(early.len() <= 800);
        assert_eq!(store.count(), 800);
    }

    #[test]
    fn test_write_and_set_status_target_row_index() {
        let store = ReportStore::new();
        store.append(record("a", 0));
        store.append(record("b", 5));

        let mut updated = record("b", 5);
        updated.status = RecordStatus::Staged;
        assert!(store.write(updated));
        assert!(!store.write(record("zzz", 9)));

        let previous = store.set_status(5, RecordStatus::Fetched);
        assert_eq!(previous, Some(RecordStatus::Staged));
        assert_eq!(store.count_status(RecordStatus::Fetched), 1);
        assert_eq!(store.set_status(42, RecordStatus::Fetched), None);
    }
}
