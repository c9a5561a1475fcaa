// src/types.rs
//! Item shapes shared by the refresh pipeline, the cache and the read API.

use serde::{Deserialize, Serialize};

/// Source-assigned story id (stable across refreshes).
pub type ItemId = u64;

/// Plain story as returned by the ranking source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub title: String,
    /// Canonical URL. Empty when the source has no external link (the refresh
    /// engine replaces it with the item page before enrichment).
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub by: String,
    /// Creation time, unix seconds.
    #[serde(default)]
    pub time: i64,
    /// Discussion count.
    #[serde(default)]
    pub descendants: i64,
}

impl Item {
    /// Host part of the URL, used by the replica mirror.
    pub fn domain(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }
}

/// OpenGraph-style metadata scraped from the item's own page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecondaryMetadata {
    pub image: Option<String>,
    pub description: Option<String>,
}

impl SecondaryMetadata {
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.description.is_none()
    }
}

/// Item plus enrichment. Serialized flat, the way the frontend consumes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedItem {
    #[serde(flatten)]
    pub item: Item,
    #[serde(rename = "ogImage")]
    pub og_image: Option<String>,
    #[serde(rename = "ogDescription")]
    pub og_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, rename = "model", skip_serializing_if = "Option::is_none")]
    pub summary_model: Option<String>,
    /// Extracted article text; kept server-side only.
    #[serde(skip)]
    pub article_text: Option<String>,
}

impl EnrichedItem {
    pub fn new(item: Item, meta: SecondaryMetadata) -> Self {
        Self {
            item,
            og_image: meta.image,
            og_description: meta.description,
            summary: None,
            summary_model: None,
            article_text: None,
        }
    }

    pub fn id(&self) -> ItemId {
        self.item.id
    }

    /// Reuse path: only the volatile counters change.
    pub fn refresh_counts(&mut self, fresh: &Item) {
        self.item.score = fresh.score;
        self.item.descendants = fresh.descendants;
    }
}
