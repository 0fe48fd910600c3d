// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod canon;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod registry;
pub mod store;
pub mod text;

// Commit, notifications and the admin channel
pub mod admin;
pub mod commit;
pub mod notify;
pub mod telegram;

pub mod runner;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::canon::{canonicalize, CanonicalKey};
pub use crate::engine::{diff, Cursor, SyncMode, SyncPlan};
pub use crate::error::{StoreError, SyncError};
pub use crate::registry::Source;
pub use crate::runner::{Pipeline, RunSummary, Synchronizer};
