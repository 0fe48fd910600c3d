// src/commit.rs
//! Append → cursor → notify, in that order, for one source's new items.
//!
//! The cursor moves only after the batch append is acknowledged. A failed
//! cursor write leaves the records committed; the next run's recent window
//! keeps them from being written twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::canon::CanonicalKey;
use crate::engine::SyncPlan;
use crate::error::SyncError;
use crate::ingest::RawItem;
use crate::notify::Notifier;
use crate::registry::Source;
use crate::store::{CommittedRecord, CursorStore, RecordStore};
use crate::text::{normalize, split_title_body};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub written: usize,
    pub cursor_saved: bool,
    pub notified: usize,
    pub notify_failures: usize,
}

pub struct CommitCoordinator {
    records: Arc<dyn RecordStore>,
    cursors: Arc<dyn CursorStore>,
    notifier: Option<Arc<dyn Notifier>>,
    title_limit: usize,
    body_limit: usize,
}

impl CommitCoordinator {
    pub fn new(records: Arc<dyn RecordStore>, cursors: Arc<dyn CursorStore>) -> Self {
        Self {
            records,
            cursors,
            notifier: None,
            title_limit: 200,
            body_limit: 45_000,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_limits(mut self, title_limit: usize, body_limit: usize) -> Self {
        self.title_limit = title_limit.max(1);
        self.body_limit = body_limit.max(1);
        self
    }

    pub async fn commit_plan(&self, source: &Source, plan: &SyncPlan) -> Result<CommitReport, SyncError> {
        self.commit(source, &plan.new_items, plan.cursor.as_ref()).await
    }

    /// Commit `items` (oldest-first) and move the cursor to `new_cursor`.
    /// Only an append failure is an error; nothing is written in that case.
    pub async fn commit(
        &self,
        source: &Source,
        items: &[(CanonicalKey, RawItem)],
        new_cursor: Option<&CanonicalKey>,
    ) -> Result<CommitReport, SyncError> {
        let mut report = CommitReport::default();
        if items.is_empty() {
            return Ok(report);
        }

        let added_at = Utc::now();
        let rows: Vec<CommittedRecord> = items
            .iter()
            .map(|(key, item)| {
                build_record(source, key, item, added_at, self.title_limit, self.body_limit)
            })
            .collect();

        if let Err(cause) = self.records.append_batch(&rows).await {
            tracing::error!(target: "sync", source = %source, rows = rows.len(), error = %cause, "append failed, batch abandoned");
            return Err(SyncError::CommitAbandoned {
                channel: source.to_string(),
                cause,
            });
        }
        report.written = rows.len();
        counter!("sync_records_committed_total").increment(rows.len() as u64);

        if let Some(key) = new_cursor.filter(|k| !k.is_empty()) {
            match self.cursors.set(source, key).await {
                Ok(()) => report.cursor_saved = true,
                Err(e) => {
                    tracing::error!(target: "sync", source = %source, cursor = %key, error = %e, "cursor write failed after append");
                }
            }
        }

        if let Some(notifier) = &self.notifier {
            for row in &rows {
                match notifier.send(row).await {
                    Ok(()) => report.notified += 1,
                    Err(e) => {
                        report.notify_failures += 1;
                        counter!("notify_failures_total").increment(1);
                        tracing::warn!(target: "notify", source = %source, key = %row.canonical_key, error = ?e, "notification failed");
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Normalize one item into its durable form.
pub fn build_record(
    source: &Source,
    key: &CanonicalKey,
    item: &RawItem,
    added_at: DateTime<Utc>,
    title_limit: usize,
    body_limit: usize,
) -> CommittedRecord {
    let title = normalize(&item.title, title_limit);
    let body = normalize(&item.body, body_limit);
    let (title, body) = if title.is_empty() {
        split_title_body(&body, title_limit, body_limit)
    } else {
        (title, body)
    };

    CommittedRecord {
        published_at: item.published_at,
        added_at,
        source: source.clone(),
        canonical_key: key.clone(),
        title,
        body,
    }
}
