//! In-memory store with failure injection, for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::canon::CanonicalKey;
use crate::error::StoreError;
use crate::registry::Source;
use crate::store::{cursor_slot, CommittedRecord, CursorStore, OffsetStore, RecordStore};

#[derive(Debug, Default)]
struct Inner {
    records: Vec<CommittedRecord>,
    cursors: HashMap<String, CanonicalKey>,
    offset: Option<i64>,
    appends: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_append: AtomicBool,
    fail_cursor_set: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_append(&self, on: bool) {
        self.fail_append.store(on, Ordering::SeqCst);
    }

    pub fn fail_cursor_set(&self, on: bool) {
        self.fail_cursor_set.store(on, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    /// Snapshot of every record, in append order.
    pub fn records(&self) -> Vec<CommittedRecord> {
        self.lock().records.clone()
    }

    /// Number of successful `append_batch` calls with at least one row.
    pub fn append_calls(&self) -> usize {
        self.lock().appends
    }

    pub fn cursor_of(&self, source: &Source) -> Option<CanonicalKey> {
        self.lock().cursors.get(&cursor_slot(source)).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a poisoned lock only means a test panicked mid-call; the data is still usable
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("injected {what} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn append_batch(&self, rows: &[CommittedRecord]) -> Result<(), StoreError> {
        Self::check(&self.fail_append, "append")?;
        if rows.is_empty() {
            return Ok(());
        }
        let mut inner = self.lock();
        inner.records.extend_from_slice(rows);
        inner.appends += 1;
        Ok(())
    }

    async fn read_tail(
        &self,
        source: &Source,
        max_rows: usize,
    ) -> Result<Vec<CommittedRecord>, StoreError> {
        Self::check(&self.fail_reads, "read")?;
        let inner = self.lock();
        let mut tail: Vec<CommittedRecord> = inner
            .records
            .iter()
            .rev()
            .filter(|r| r.source.same_as(source))
            .take(max_rows)
            .cloned()
            .collect();
        tail.reverse();
        Ok(tail)
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn get(&self, source: &Source) -> Result<Option<CanonicalKey>, StoreError> {
        Self::check(&self.fail_reads, "read")?;
        Ok(self.cursor_of(source))
    }

    async fn set(&self, source: &Source, key: &CanonicalKey) -> Result<(), StoreError> {
        Self::check(&self.fail_cursor_set, "cursor write")?;
        self.lock().cursors.insert(cursor_slot(source), key.clone());
        Ok(())
    }
}

#[async_trait]
impl OffsetStore for MemoryStore {
    async fn get_offset(&self) -> Result<Option<i64>, StoreError> {
        Ok(self.lock().offset)
    }

    async fn set_offset(&self, offset: i64) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.offset = Some(inner.offset.map_or(offset, |o| o.max(offset)));
        Ok(())
    }
}
