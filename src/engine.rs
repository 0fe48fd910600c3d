//! # Synchronization Engine
//! Pure, testable logic that maps `(fetched items, cursor, recent window)` →
//! the oldest-first list of genuinely new items plus the next cursor.
//! No I/O; every fallible step lives in the adapters or the commit step.
//!
//! Policy: on first activation (no cursor) only the most recent
//! `bootstrap_limit` items are taken; afterwards the engine resumes strictly
//! after the cursor. A cursor that is not in the fetched window is a gap:
//! everything visible is taken and the caller logs it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::canon::{canonicalize, composite_key, CanonicalKey};
use crate::ingest::RawItem;

/// Durable watermark: the most recently committed item of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub last_key: CanonicalKey,
}

impl Cursor {
    pub fn new(last_key: CanonicalKey) -> Self {
        Self { last_key }
    }
}

/// How the new-item set was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// No cursor yet; bootstrap cap applied.
    Bootstrap,
    /// Cursor found in the fetched window.
    Resumed,
    /// Cursor present but not visible; all unskipped items taken.
    Gap,
}

#[derive(Debug, Clone)]
pub struct SyncPlan {
    /// Oldest-first.
    pub new_items: Vec<(CanonicalKey, RawItem)>,
    /// Key of the newest new item with an identity, else the input cursor.
    pub cursor: Option<CanonicalKey>,
    pub mode: SyncMode,
    pub skipped_duplicates: usize,
    pub dropped_by_bootstrap: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.new_items.is_empty()
    }
}

/// Dedup key of an item: its identifier, else `title|published_at`.
/// Both empty means no stable identity (empty key).
pub fn item_key(item: &RawItem) -> CanonicalKey {
    if !item.identifier.trim().is_empty() {
        return canonicalize(&item.identifier);
    }
    composite_key(&item.title, &item.published_at)
}

/// Decide which of `raw_items` (newest-first, as adapters return them) are new.
pub fn diff(
    raw_items: &[RawItem],
    cursor: Option<&Cursor>,
    recent_window: &HashSet<CanonicalKey>,
    bootstrap_limit: usize,
) -> SyncPlan {
    let resume_after = cursor.map(|c| &c.last_key).filter(|k| !k.is_empty());
    let mut mode = if resume_after.is_some() {
        SyncMode::Gap
    } else {
        SyncMode::Bootstrap
    };

    let mut seen: HashSet<CanonicalKey> = HashSet::new();
    let mut skipped_duplicates = 0usize;
    let mut newest_first: Vec<(CanonicalKey, RawItem)> = Vec::new();

    for item in raw_items {
        let key = item_key(item);

        // The cursor item and everything older are already committed.
        // Checked before the window so a windowed cursor still stops the scan.
        if let Some(last) = resume_after {
            if !key.is_empty() && &key == last {
                mode = SyncMode::Resumed;
                break;
            }
        }

        if !key.is_empty() && (recent_window.contains(&key) || !seen.insert(key.clone())) {
            skipped_duplicates += 1;
            continue;
        }
        newest_first.push((key, item.clone()));
    }

    let mut dropped_by_bootstrap = 0usize;
    if mode == SyncMode::Bootstrap && newest_first.len() > bootstrap_limit {
        dropped_by_bootstrap = newest_first.len() - bootstrap_limit;
        newest_first.truncate(bootstrap_limit);
    }

    let mut new_items = newest_first;
    new_items.reverse();

    let next_cursor = new_items
        .iter()
        .rev()
        .map(|(key, _)| key)
        .find(|key| !key.is_empty())
        .or(resume_after)
        .cloned();

    SyncPlan {
        new_items,
        cursor: next_cursor,
        mode,
        skipped_duplicates,
        dropped_by_bootstrap,
    }
}
