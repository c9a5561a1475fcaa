// src/source/hacker_news.rs
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;

use super::{RemoteSource, USER_AGENT};
use crate::types::{Item, ItemId};

pub const HN_API_BASE: &str = "https://hacker-news.firebaseio.com/v0";
pub const HN_ITEM_PAGE: &str = "https://news.ycombinator.com/item?id=";

/// Firebase-backed Hacker News client.
#[derive(Clone)]
pub struct HackerNewsSource {
    http: Client,
    base: String,
}

/// Raw item as served by Firebase; every field but `id` may be absent.
#[derive(Debug, Deserialize)]
struct HnItem {
    id: ItemId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    by: Option<String>,
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    descendants: Option<i64>,
}

impl From<HnItem> for Item {
    fn from(raw: HnItem) -> Self {
        Item {
            id: raw.id,
            title: raw.title.unwrap_or_default(),
            url: raw.url.unwrap_or_default(),
            score: raw.score.unwrap_or_default(),
            by: raw.by.unwrap_or_default(),
            time: raw.time.unwrap_or_default(),
            descendants: raw.descendants.unwrap_or_default(),
        }
    }
}

impl HackerNewsSource {
    pub fn new() -> Result<Self> {
        Self::with_base(HN_API_BASE)
    }

    /// Point the client at another API root (tests, mirrors).
    pub fn with_base(base: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .context("build hacker news client")?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl RemoteSource for HackerNewsSource {
    async fn ranked_ids(&self) -> Result<Vec<ItemId>> {
        let url = format!("{}/topstories.json", self.base);
        let start = Instant::now();
        let ids: Vec<ItemId> = self
            .http
            .get(&url)
            .send()
            .await
            .context("top stories request")?
            .error_for_status()
            .context("top stories non-2xx")?
            .json()
            .await
            .context("top stories decode")?;
        tracing::debug!(
            target: "source",
            event = "fetch_completed",
            total_ids = ids.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "top story ids fetched"
        );
        Ok(ids)
    }

    async fn item(&self, id: ItemId) -> Result<Item> {
        let url = format!("{}/item/{id}.json", self.base);
        let raw: Option<HnItem> = self
            .http
            .get(&url)
            .send()
            .await
            .context("item request")?
            .error_for_status()
            .context("item non-2xx")?
            .json()
            .await
            .context("item decode")?;
        // Firebase answers `null` for deleted or unknown ids
        let raw = raw.ok_or_else(|| anyhow!("item {id} not found"))?;
        Ok(raw.into())
    }

    fn item_page_url(&self, id: ItemId) -> String {
        format!("{HN_ITEM_PAGE}{id}")
    }
}
