//! Durable state: the append-only record table, the per-source cursor
//! side-table and the admin-channel offset.
//!
//! ## Local layout
//!
//! ```text
//! {state_dir}/
//! ├── {table}.jsonl   # append-only CommittedRecord rows, one JSON per line
//! ├── cursors/        # one {source}.json per source (atomic rewrite)
//! ├── admin_offset.json
//! └── sources.json    # registry (see crate::registry)
//! ```

pub mod local;
pub mod memory;

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canon::CanonicalKey;
use crate::error::{io_err, StoreError};
use crate::registry::Source;

pub use local::LocalStore;
pub use memory::MemoryStore;

/// The durable, append-only unit. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedRecord {
    pub published_at: DateTime<Utc>,
    pub added_at: DateTime<Utc>,
    pub source: Source,
    pub canonical_key: CanonicalKey,
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append all rows as one batch. Either the call fails or every row is durable.
    async fn append_batch(&self, rows: &[CommittedRecord]) -> Result<(), StoreError>;

    /// The last `max_rows` records of `source`, oldest-first.
    async fn read_tail(
        &self,
        source: &Source,
        max_rows: usize,
    ) -> Result<Vec<CommittedRecord>, StoreError>;
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, source: &Source) -> Result<Option<CanonicalKey>, StoreError>;
    async fn set(&self, source: &Source, key: &CanonicalKey) -> Result<(), StoreError>;
}

/// Opaque, monotonically increasing admin-channel offset.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    async fn get_offset(&self) -> Result<Option<i64>, StoreError>;
    async fn set_offset(&self, offset: i64) -> Result<(), StoreError>;
}

/// Side-table key for a source; usernames compare case-insensitively.
pub(crate) fn cursor_slot(source: &Source) -> String {
    source.as_str().to_ascii_lowercase()
}

/// Rebuild the recent-window set from tail rows. Empty keys are never members.
pub fn recent_window(rows: &[CommittedRecord]) -> HashSet<CanonicalKey> {
    rows.iter()
        .filter(|r| !r.canonical_key.is_empty())
        .map(|r| r.canonical_key.clone())
        .collect()
}

/// Replace `path` with `bytes` through a uniquely named temp file in the
/// same directory, so concurrent writers never share a temp path.
pub(crate) async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<(), StoreError> {
    let path = path.to_path_buf();
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| io_err(&dir, e))?;

    let target = path.clone();
    tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| io_err(&dir, e))?;
        tmp.write_all(&bytes).map_err(|e| io_err(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| io_err(tmp.path(), e))?;
        tmp.persist(&target).map_err(|e| io_err(&target, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| io_err(&path, std::io::Error::other(e)))?
}
