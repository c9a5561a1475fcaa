// src/source/mod.rs
pub mod hacker_news;

use anyhow::Result;

use crate::types::{Item, ItemId};

pub use hacker_news::HackerNewsSource;

/// User-Agent sent on every outbound request the service makes.
pub const USER_AGENT: &str = "yamanlabs-hn/2.0 (+https://hn30.yamanlabs.com)";

/// Where the ranked ids and the per-id details come from.
#[async_trait::async_trait]
pub trait RemoteSource: Send + Sync {
    /// Full ranked list, best first. Callers truncate.
    async fn ranked_ids(&self) -> Result<Vec<ItemId>>;
    async fn item(&self, id: ItemId) -> Result<Item>;
    /// Link to the source's own page for `id`, used when an item has no URL.
    fn item_page_url(&self, id: ItemId) -> String;
}
