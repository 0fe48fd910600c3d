//! Local filesystem store.
//!
//! Records are appended to a JSON Lines file in a single write followed by
//! `sync_data`. A torn trailing line left by a crash is skipped on read and
//! terminated before the next append. The tail is read backwards in blocks,
//! so a run touches only the end of the table.
//!
//! Cursors and the admin offset have different writers and live in separate
//! files: `cursors/<source>.json` and `admin_offset.json`. Each is replaced
//! whole through a uniquely named temp file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::canon::CanonicalKey;
use crate::error::{io_err, StoreError};
use crate::registry::Source;
use crate::store::{
    cursor_slot, write_atomic, CommittedRecord, CursorStore, OffsetStore, RecordStore,
};

const CURSOR_DIR: &str = "cursors";
const OFFSET_FILE: &str = "admin_offset.json";
const TAIL_BLOCK: usize = 64 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct CursorFile {
    key: CanonicalKey,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OffsetFile {
    offset: i64,
    updated_at: DateTime<Utc>,
}

/// File-backed record table and side-tables rooted at a state directory.
pub struct LocalStore {
    root: PathBuf,
    table: String,
    append_lock: Mutex<()>,
    offset_lock: Mutex<()>,
}

impl LocalStore {
    /// Open (creating if needed) the store under `root`. Fails if the
    /// directory cannot be created or the existing offset file is unreadable.
    pub async fn open(root: impl Into<PathBuf>, table: &str) -> Result<Self, StoreError> {
        let store = Self {
            root: root.into(),
            table: table.to_string(),
            append_lock: Mutex::new(()),
            offset_lock: Mutex::new(()),
        };
        let cursor_dir = store.root.join(CURSOR_DIR);
        tokio::fs::create_dir_all(&cursor_dir)
            .await
            .map_err(|e| io_err(&cursor_dir, e))?;
        read_json::<OffsetFile>(&store.offset_path()).await?;
        Ok(store)
    }

    pub fn records_path(&self) -> PathBuf {
        self.root.join(format!("{}.jsonl", self.table))
    }

    fn cursor_path(&self, source: &Source) -> PathBuf {
        self.root
            .join(CURSOR_DIR)
            .join(format!("{}.json", cursor_slot(source)))
    }

    fn offset_path(&self) -> PathBuf {
        self.root.join(OFFSET_FILE)
    }
}

/// `None` when the file is missing or blank.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(raw) if raw.trim_ascii().is_empty() => Ok(None),
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Parse one table line into `out` if it belongs to `source`.
fn take_line(line: &[u8], source: &Source, path: &Path, out: &mut Vec<CommittedRecord>) {
    if line.trim_ascii().is_empty() {
        return;
    }
    match serde_json::from_slice::<CommittedRecord>(line) {
        Ok(row) if row.source.same_as(source) => out.push(row),
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(target: "store", path = %path.display(), error = %e, "skipping unreadable record line");
        }
    }
}

#[async_trait]
impl RecordStore for LocalStore {
    async fn append_batch(&self, rows: &[CommittedRecord]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut buf, row)?;
            buf.push(b'\n');
        }

        let path = self.records_path();
        let _guard = self.append_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await
            .map_err(|e| io_err(&path, e))?;

        // Terminate a torn line from an interrupted earlier append.
        let len = file.metadata().await.map_err(|e| io_err(&path, e))?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))
                .await
                .map_err(|e| io_err(&path, e))?;
            file.read_exact(&mut last)
                .await
                .map_err(|e| io_err(&path, e))?;
            if last[0] != b'\n' {
                buf.insert(0, b'\n');
            }
        }

        file.write_all(&buf).await.map_err(|e| io_err(&path, e))?;
        file.flush().await.map_err(|e| io_err(&path, e))?;
        file.sync_data().await.map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    async fn read_tail(
        &self,
        source: &Source,
        max_rows: usize,
    ) -> Result<Vec<CommittedRecord>, StoreError> {
        if max_rows == 0 {
            return Ok(Vec::new());
        }
        let path = self.records_path();
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&path, e)),
        };
        let mut pos = file.metadata().await.map_err(|e| io_err(&path, e))?.len();

        // Newest-first while scanning; `carry` holds the end of a line whose
        // start lies in an earlier block.
        let mut newest_first: Vec<CommittedRecord> = Vec::new();
        let mut carry: Vec<u8> = Vec::new();
        while pos > 0 && newest_first.len() < max_rows {
            let n = pos.min(TAIL_BLOCK as u64);
            pos -= n;
            let mut block = vec![0u8; n as usize];
            file.seek(SeekFrom::Start(pos))
                .await
                .map_err(|e| io_err(&path, e))?;
            file.read_exact(&mut block)
                .await
                .map_err(|e| io_err(&path, e))?;
            block.extend_from_slice(&carry);

            let lines_from = if pos == 0 {
                0
            } else {
                match block.iter().position(|&b| b == b'\n') {
                    Some(nl) => nl + 1,
                    None => {
                        carry = block;
                        continue;
                    }
                }
            };
            for line in block[lines_from..].rsplit(|&b| b == b'\n') {
                if newest_first.len() == max_rows {
                    break;
                }
                take_line(line, source, &path, &mut newest_first);
            }
            carry = block[..lines_from.saturating_sub(1)].to_vec();
        }

        newest_first.reverse();
        Ok(newest_first)
    }
}

#[async_trait]
impl CursorStore for LocalStore {
    async fn get(&self, source: &Source) -> Result<Option<CanonicalKey>, StoreError> {
        let file = read_json::<CursorFile>(&self.cursor_path(source)).await?;
        Ok(file.map(|f| f.key).filter(|k| !k.is_empty()))
    }

    async fn set(&self, source: &Source, key: &CanonicalKey) -> Result<(), StoreError> {
        let file = CursorFile {
            key: key.clone(),
            updated_at: Utc::now(),
        };
        write_atomic(&self.cursor_path(source), serde_json::to_vec_pretty(&file)?).await
    }
}

#[async_trait]
impl OffsetStore for LocalStore {
    async fn get_offset(&self) -> Result<Option<i64>, StoreError> {
        Ok(read_json::<OffsetFile>(&self.offset_path())
            .await?
            .map(|f| f.offset))
    }

    async fn set_offset(&self, offset: i64) -> Result<(), StoreError> {
        let _guard = self.offset_lock.lock().await;
        let path = self.offset_path();
        let current = read_json::<OffsetFile>(&path).await?.map(|f| f.offset);
        // never move backwards
        if current.is_some_and(|c| c >= offset) {
            return Ok(());
        }
        let file = OffsetFile {
            offset,
            updated_at: Utc::now(),
        };
        write_atomic(&path, serde_json::to_vec_pretty(&file)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::canonicalize;
    use tempfile::TempDir;

    fn record(source: &str, key: &str) -> CommittedRecord {
        CommittedRecord {
            published_at: Utc::now(),
            added_at: Utc::now(),
            source: Source::parse(source).unwrap(),
            canonical_key: canonicalize(key),
            title: "t".into(),
            body: "b".into(),
        }
    }

    fn keys(rows: &[CommittedRecord]) -> Vec<&str> {
        rows.iter().map(|r| r.canonical_key.as_str()).collect()
    }

    #[tokio::test]
    async fn missing_side_tables_mean_empty_state() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path(), "posts").await.unwrap();
        let src = Source::parse("chan").unwrap();
        assert_eq!(CursorStore::get(&store, &src).await.unwrap(), None);
        assert_eq!(store.get_offset().await.unwrap(), None);
    }

    #[tokio::test]
    async fn side_table_writes_leave_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path(), "posts").await.unwrap();
        store.set_offset(10).await.unwrap();
        let src = Source::parse("chan").unwrap();
        store.set(&src, &canonicalize("https://t.me/chan/1")).await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["admin_offset.json", "cursors"]);
        let cursors: Vec<_> = std::fs::read_dir(tmp.path().join("cursors"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(cursors, vec![std::ffi::OsString::from("chan.json")]);
    }

    #[tokio::test]
    async fn torn_line_is_skipped_and_terminated() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path(), "posts").await.unwrap();
        store.append_batch(&[record("chan", "https://t.me/chan/1")]).await.unwrap();

        // simulate a crash mid-append
        let path = store.records_path();
        let mut raw = std::fs::read(&path).unwrap();
        raw.extend_from_slice(br#"{"published_at":"2025-"#);
        std::fs::write(&path, raw).unwrap();

        store.append_batch(&[record("chan", "https://t.me/chan/2")]).await.unwrap();

        let src = Source::parse("chan").unwrap();
        let tail = store.read_tail(&src, 10).await.unwrap();
        assert_eq!(keys(&tail), vec!["https://t.me/chan/1", "https://t.me/chan/2"]);
    }

    #[tokio::test]
    async fn line_torn_inside_a_multibyte_char_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path(), "posts").await.unwrap();
        let mut first = record("chan", "https://t.me/chan/1");
        first.title = "привет".into();
        store.append_batch(&[first]).await.unwrap();

        // crash right after the first byte of a two-byte character
        let mut torn = record("chan", "https://t.me/chan/2");
        torn.title = "мир".into();
        let line = serde_json::to_vec(&torn).unwrap();
        let cut = line.iter().position(|&b| b >= 0x80).unwrap() + 1;
        let path = store.records_path();
        let mut raw = std::fs::read(&path).unwrap();
        raw.extend_from_slice(&line[..cut]);
        std::fs::write(&path, raw).unwrap();

        // torn tail on its own
        let src = Source::parse("chan").unwrap();
        let tail = store.read_tail(&src, 10).await.unwrap();
        assert_eq!(keys(&tail), vec!["https://t.me/chan/1"]);

        store.append_batch(&[record("chan", "https://t.me/chan/3")]).await.unwrap();
        let tail = store.read_tail(&src, 10).await.unwrap();
        assert_eq!(keys(&tail), vec!["https://t.me/chan/1", "https://t.me/chan/3"]);
        assert_eq!(tail[0].title, "привет");
    }

    #[tokio::test]
    async fn tail_spanning_many_blocks_is_exact() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path(), "posts").await.unwrap();
        let mut batch = Vec::new();
        for i in 1..=3000 {
            let mut row = record("alpha", &format!("https://t.me/alpha/{i}"));
            row.body = "ж".repeat(40);
            batch.push(row);
            batch.push(record("beta", &format!("https://t.me/beta/{i}")));
        }
        store.append_batch(&batch).await.unwrap();
        assert!(std::fs::metadata(store.records_path()).unwrap().len() > 4 * TAIL_BLOCK as u64);

        let alpha = Source::parse("alpha").unwrap();
        let tail = store.read_tail(&alpha, 2500).await.unwrap();
        assert_eq!(tail.len(), 2500);
        assert_eq!(tail[0].canonical_key.as_str(), "https://t.me/alpha/501");
        assert_eq!(tail[2499].canonical_key.as_str(), "https://t.me/alpha/3000");
        assert!(tail.windows(2).all(|w| {
            let id = |r: &CommittedRecord| {
                r.canonical_key.as_str().rsplit('/').next().unwrap().parse::<u32>().unwrap()
            };
            id(&w[0]) + 1 == id(&w[1])
        }));

        // asking for more than exists returns everything
        let beta = Source::parse("beta").unwrap();
        assert_eq!(store.read_tail(&beta, 10_000).await.unwrap().len(), 3000);
    }

    #[tokio::test]
    async fn cursor_and_offset_writers_do_not_clobber_each_other() {
        let tmp = TempDir::new().unwrap();
        let runner = LocalStore::open(tmp.path(), "posts").await.unwrap();
        let admin = LocalStore::open(tmp.path(), "posts").await.unwrap();

        let cursors = async {
            for i in 0..200 {
                let src = Source::parse(&format!("chan{i}")).unwrap();
                let key = canonicalize(&format!("https://t.me/chan{i}/{i}"));
                runner.set(&src, &key).await.unwrap();
            }
        };
        let offsets = async {
            for n in 1..=200 {
                admin.set_offset(n).await.unwrap();
            }
        };
        tokio::join!(cursors, offsets);

        let reopened = LocalStore::open(tmp.path(), "posts").await.unwrap();
        for i in 0..200 {
            let src = Source::parse(&format!("chan{i}")).unwrap();
            let key = CursorStore::get(&reopened, &src).await.unwrap().unwrap();
            assert_eq!(key.as_str(), format!("https://t.me/chan{i}/{i}"));
        }
        assert_eq!(reopened.get_offset().await.unwrap(), Some(200));
    }
}
