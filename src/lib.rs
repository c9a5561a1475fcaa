// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod enrich;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod proxy;
pub mod rate_limit;
pub mod refresh;
pub mod replica;
pub mod source;
pub mod summarize;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::cache::SnapshotCache;
pub use crate::refresh::{RefreshConfig, RefreshEngine};
pub use crate::types::{EnrichedItem, Item, ItemId, SecondaryMetadata};
