pub mod telegram;

use anyhow::Result;

use crate::store::CommittedRecord;

pub use telegram::TelegramNotifier;

/// Delivery of a freshly committed record. Failures are reported, never retried
/// by the caller.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, record: &CommittedRecord) -> Result<()>;
}

/// Plain-text message for a record: source, title, body, then the post link.
pub fn render(record: &CommittedRecord) -> String {
    let mut out = format!("@{}", record.source);
    if !record.title.is_empty() {
        out.push('\n');
        out.push_str(&record.title);
    }
    if !record.body.is_empty() && record.body != record.title {
        out.push_str("\n\n");
        out.push_str(&record.body);
    }
    let key = record.canonical_key.as_str();
    if key.starts_with("https://") || key.starts_with("http://") {
        out.push_str("\n\n");
        out.push_str(key);
    }
    out
}
