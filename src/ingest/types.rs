// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::Source;

/// One fetched unit, as produced by an adapter. Ephemeral; never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub identifier: String, // post link or guid, may be empty
    pub published_at: DateTime<Utc>,
    pub title: String,
    pub body: String, // raw, possibly HTML
}

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Items for `source`, newest-first (best effort).
    async fn fetch_latest(&self, source: &Source) -> Result<Vec<RawItem>>;
    fn name(&self) -> &str;
}
