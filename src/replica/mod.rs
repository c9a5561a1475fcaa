// src/replica/mod.rs
//! Best-effort mirror of the current top list for downstream consumers
//! (the edge function that renders share images reads it).

pub mod turso;

use anyhow::Result;

use crate::types::Item;

pub use turso::TursoReplica;

#[async_trait::async_trait]
pub trait ReplicaSink: Send + Sync {
    /// Make the replica hold exactly `items` (ids not listed are removed).
    async fn sync_top(&self, items: &[Item]) -> Result<()>;
}
