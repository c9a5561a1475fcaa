// tests/common/mod.rs
//
// In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;

use hn30::enrich::{ArticleExtractor, ContentEnricher};
use hn30::ledger::{Ledger, SqliteLedger};
use hn30::notify::NotificationSink;
use hn30::refresh::{RefreshConfig, RefreshEngine};
use hn30::replica::ReplicaSink;
use hn30::source::RemoteSource;
use hn30::summarize::{Summarizer, Summary};
use hn30::{EnrichedItem, Item, ItemId, SecondaryMetadata, SnapshotCache};

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn item(id: ItemId, url: &str, score: i64, age_secs: i64) -> Item {
    Item {
        id,
        title: format!("Story {id}"),
        url: url.to_string(),
        score,
        by: "alice".into(),
        time: now_ts() - age_secs,
        descendants: 3,
    }
}

/// Ranking and items editable between cycles.
#[derive(Default)]
pub struct FakeSource {
    pub ranking: Mutex<Vec<ItemId>>,
    pub items: Mutex<HashMap<ItemId, Item>>,
    pub ranking_down: AtomicBool,
    pub failing: Mutex<HashSet<ItemId>>,
}

impl FakeSource {
    pub fn new(items: Vec<Item>) -> Self {
        let s = Self::default();
        s.set(items);
        s
    }

    /// Replace ranking and items with `items`, in order.
    pub fn set(&self, items: Vec<Item>) {
        *self.ranking.lock().unwrap() = items.iter().map(|i| i.id).collect();
        let mut map = self.items.lock().unwrap();
        map.clear();
        for it in items {
            map.insert(it.id, it);
        }
    }

    pub fn update(&self, id: ItemId, f: impl FnOnce(&mut Item)) {
        if let Some(it) = self.items.lock().unwrap().get_mut(&id) {
            f(it);
        }
    }

    pub fn fail_item(&self, id: ItemId) {
        self.failing.lock().unwrap().insert(id);
    }
}

#[async_trait::async_trait]
impl RemoteSource for FakeSource {
    async fn ranked_ids(&self) -> Result<Vec<ItemId>> {
        if self.ranking_down.load(Ordering::SeqCst) {
            return Err(anyhow!("topstories unavailable"));
        }
        Ok(self.ranking.lock().unwrap().clone())
    }

    async fn item(&self, id: ItemId) -> Result<Item> {
        if self.failing.lock().unwrap().contains(&id) {
            return Err(anyhow!("item {id} timed out"));
        }
        self.items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("item {id} is null"))
    }

    fn item_page_url(&self, id: ItemId) -> String {
        format!("https://news.ycombinator.com/item?id={id}")
    }
}

/// Returns an image derived from the URL and counts calls per URL.
#[derive(Default)]
pub struct CountingEnricher {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

#[async_trait::async_trait]
impl ContentEnricher for CountingEnricher {
    async fn metadata(&self, url: &str) -> Result<SecondaryMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(url.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }
        Ok(SecondaryMetadata {
            image: Some(format!("{url}/og.png")),
            description: Some("desc".into()),
        })
    }
}

/// Forwards every notified id to a channel.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<ItemId>,
}

impl RecordingSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ItemId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, item: &EnrichedItem) -> Result<()> {
        let _ = self.tx.send(item.id());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Always fails, counting attempts.
#[derive(Default)]
pub struct FailingSink {
    pub attempts: AtomicUsize,
}

#[async_trait::async_trait]
impl NotificationSink for FailingSink {
    async fn notify(&self, _item: &EnrichedItem) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("push provider returned 503"))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[derive(Default)]
pub struct RecordingReplica {
    pub syncs: Mutex<Vec<Vec<ItemId>>>,
    pub fail: AtomicBool,
}

#[async_trait::async_trait]
impl ReplicaSink for RecordingReplica {
    async fn sync_top(&self, items: &[Item]) -> Result<()> {
        self.syncs
            .lock()
            .unwrap()
            .push(items.iter().map(|i| i.id).collect());
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("replica unreachable"));
        }
        Ok(())
    }
}

pub struct FixedExtractor {
    pub text: Option<String>,
}

#[async_trait::async_trait]
impl ArticleExtractor for FixedExtractor {
    async fn article_text(&self, url: &str) -> Result<String> {
        self.text
            .clone()
            .ok_or_else(|| anyhow!("failed to fetch {url}: status 403"))
    }
}

#[derive(Default)]
pub struct FixedSummarizer {
    pub calls: AtomicUsize,
    pub fail: bool,
}

#[async_trait::async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, text: &str) -> Result<Summary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("model overloaded"));
        }
        Ok(Summary {
            summary: format!("summary of {} chars", text.len()),
            model: "test-model".into(),
        })
    }
}

/// Everything a refresh test needs, wired with zero inter-item delay.
pub struct Harness {
    pub source: Arc<FakeSource>,
    pub enricher: Arc<CountingEnricher>,
    pub ledger: Arc<SqliteLedger>,
    pub cache: Arc<SnapshotCache>,
}

impl Harness {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            source: Arc::new(FakeSource::new(items)),
            enricher: Arc::new(CountingEnricher::default()),
            ledger: Arc::new(SqliteLedger::in_memory().expect("in-memory ledger")),
            cache: Arc::new(SnapshotCache::new()),
        }
    }

    pub fn engine(&self, sink: Arc<dyn NotificationSink>) -> RefreshEngine {
        let ledger: Arc<dyn Ledger> = self.ledger.clone();
        RefreshEngine::new(
            self.source.clone(),
            self.enricher.clone(),
            ledger,
            sink,
            self.cache.clone(),
            RefreshConfig {
                item_delay: std::time::Duration::ZERO,
                ..Default::default()
            },
        )
    }
}
