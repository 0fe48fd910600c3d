// src/ingest/mod.rs
//! Source adapters: structured feeds first, page scrape as fallback.

pub mod chain;
pub mod dates;
pub mod providers;
pub mod types;

pub use chain::{AdapterChain, FetchOutcome};
pub use types::{RawItem, SourceAdapter};
