// tests/commit_no_duplicates.rs
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use channel_sync::commit::CommitCoordinator;
use channel_sync::engine::{diff, Cursor};
use channel_sync::error::SyncError;
use channel_sync::ingest::RawItem;
use channel_sync::notify::Notifier;
use channel_sync::store::{recent_window, CommittedRecord, MemoryStore, RecordStore};
use channel_sync::Source;
use chrono::{Duration, TimeZone, Utc};

#[derive(Default)]
struct RecordingNotifier {
    seen: Mutex<Vec<String>>,
    fail_every: usize,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, record: &CommittedRecord) -> anyhow::Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && n % self.fail_every == 0 {
            return Err(anyhow!("sink down"));
        }
        self.seen
            .lock()
            .unwrap()
            .push(record.canonical_key.as_str().to_string());
        Ok(())
    }
}

fn feed(ids: std::ops::RangeInclusive<u32>) -> Vec<RawItem> {
    let base = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
    ids.rev()
        .map(|i| RawItem {
            identifier: format!("https://t.me/chan/{i}"),
            published_at: base + Duration::minutes(i as i64),
            title: format!("post {i}"),
            body: format!("<p>body {i}</p>"),
        })
        .collect()
}

/// What the runner does for one source, against the memory store.
async fn pass(store: &Arc<MemoryStore>, committer: &CommitCoordinator, items: &[RawItem]) -> Result<usize, SyncError> {
    let src = Source::parse("chan").unwrap();
    let tail = store.read_tail(&src, 200).await?;
    let window = recent_window(&tail);
    let cursor = store.cursor_of(&src).map(Cursor::new);
    let plan = diff(items, cursor.as_ref(), &window, 20);
    Ok(committer.commit_plan(&src, &plan).await?.written)
}

fn coordinator(store: &Arc<MemoryStore>) -> CommitCoordinator {
    CommitCoordinator::new(store.clone(), store.clone())
}

fn unique_keys(store: &MemoryStore) -> bool {
    let records = store.records();
    let keys: HashSet<_> = records.iter().map(|r| r.canonical_key.clone()).collect();
    keys.len() == records.len()
}

#[tokio::test]
async fn repeated_runs_never_duplicate() {
    let store = Arc::new(MemoryStore::new());
    let committer = coordinator(&store);

    assert_eq!(pass(&store, &committer, &feed(1..=5)).await.unwrap(), 5);
    assert_eq!(pass(&store, &committer, &feed(1..=5)).await.unwrap(), 0);
    assert_eq!(pass(&store, &committer, &feed(3..=8)).await.unwrap(), 3);

    assert_eq!(store.records().len(), 8);
    assert!(unique_keys(&store));
    assert_eq!(store.append_calls(), 2);
}

#[tokio::test]
async fn append_failure_commits_nothing_and_keeps_cursor() {
    let store = Arc::new(MemoryStore::new());
    let committer = coordinator(&store);
    let src = Source::parse("chan").unwrap();

    pass(&store, &committer, &feed(1..=3)).await.unwrap();
    let cursor_before = store.cursor_of(&src);

    store.fail_append(true);
    let err = pass(&store, &committer, &feed(1..=6)).await.unwrap_err();
    assert!(matches!(err, SyncError::CommitAbandoned { .. }));
    assert_eq!(store.records().len(), 3);
    assert_eq!(store.cursor_of(&src), cursor_before);

    // next run picks the abandoned items up
    store.fail_append(false);
    assert_eq!(pass(&store, &committer, &feed(1..=6)).await.unwrap(), 3);
    assert!(unique_keys(&store));
}

#[tokio::test]
async fn cursor_write_failure_is_recovered_by_window() {
    let store = Arc::new(MemoryStore::new());
    let committer = coordinator(&store);
    let src = Source::parse("chan").unwrap();

    pass(&store, &committer, &feed(1..=3)).await.unwrap();

    store.fail_cursor_set(true);
    let src_items = feed(1..=5);
    let report = committer
        .commit_plan(
            &src,
            &diff(
                &src_items,
                store.cursor_of(&src).map(Cursor::new).as_ref(),
                &recent_window(&store.read_tail(&src, 200).await.unwrap()),
                20,
            ),
        )
        .await
        .unwrap();
    assert_eq!(report.written, 2);
    assert!(!report.cursor_saved);
    assert_eq!(store.cursor_of(&src).unwrap().as_str(), "https://t.me/chan/3");

    // stale cursor, but the window rejects 4 and 5
    store.fail_cursor_set(false);
    assert_eq!(pass(&store, &committer, &feed(1..=6)).await.unwrap(), 1);
    assert_eq!(store.records().len(), 6);
    assert!(unique_keys(&store));
    assert_eq!(store.cursor_of(&src).unwrap().as_str(), "https://t.me/chan/6");
}

#[tokio::test]
async fn notification_failures_do_not_roll_back() {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier {
        fail_every: 2,
        ..Default::default()
    });
    let committer = coordinator(&store).with_notifier(notifier.clone());
    let src = Source::parse("chan").unwrap();

    let items = feed(1..=4);
    let plan = diff(&items, None, &HashSet::new(), 20);
    let report = committer.commit_plan(&src, &plan).await.unwrap();

    assert_eq!(report.written, 4);
    assert!(report.cursor_saved);
    assert_eq!(report.notified, 2);
    assert_eq!(report.notify_failures, 2);
    assert_eq!(store.records().len(), 4);
    // delivered in commit order, oldest first
    assert_eq!(
        *notifier.seen.lock().unwrap(),
        vec!["https://t.me/chan/1", "https://t.me/chan/3"]
    );
}

#[tokio::test]
async fn empty_plan_touches_nothing() {
    let store = Arc::new(MemoryStore::new());
    let committer = coordinator(&store);
    let src = Source::parse("chan").unwrap();
    let report = committer.commit(&src, &[], None).await.unwrap();
    assert_eq!(report.written, 0);
    assert_eq!(store.append_calls(), 0);
    assert_eq!(store.cursor_of(&src), None);
}

#[tokio::test]
async fn records_are_normalized() {
    let store = Arc::new(MemoryStore::new());
    let committer = coordinator(&store).with_limits(4, 100);
    let src = Source::parse("chan").unwrap();
    let plan = diff(&feed(1..=1), None, &HashSet::new(), 20);
    committer.commit_plan(&src, &plan).await.unwrap();

    let rec = &store.records()[0];
    assert_eq!(rec.title, "post");
    assert_eq!(rec.body, "body 1");
    assert_eq!(rec.source, src);
}
