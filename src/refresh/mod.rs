// src/refresh/mod.rs
//! # Refresh engine
//! One cycle: fetch ranking → prune cache → per item (detail, reuse-or-enrich,
//! ledger merge, notify-once check, cache write, politeness delay) → finalize.
//!
//! A ranking failure aborts the cycle and leaves the previous snapshot in place.
//! Every per-item failure is absorbed; the item keeps whatever entry it had.

pub mod scheduler;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::{counter, gauge};
use tracing::{debug, error, info, warn, Instrument};

use crate::cache::SnapshotCache;
use crate::config::Config;
use crate::enrich::ContentEnricher;
use crate::ledger::{EligibilityPolicy, Ledger};
use crate::notify::NotificationSink;
use crate::replica::ReplicaSink;
use crate::source::RemoteSource;
use crate::types::{EnrichedItem, Item, ItemId};

pub use scheduler::spawn_scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
    pub top_n: usize,
    /// Pause between items (politeness toward the enrichment targets).
    pub item_delay: Duration,
    pub policy: EligibilityPolicy,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            top_n: 30,
            item_delay: Duration::from_millis(500),
            policy: EligibilityPolicy::default(),
        }
    }
}

impl RefreshConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            top_n: cfg.refresh.top_n,
            item_delay: Duration::from_millis(cfg.refresh.item_delay_ms),
            policy: cfg.eligibility(),
        }
    }
}

/// Counts for one finished cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub ranked: usize,
    pub enriched: usize,
    pub reused: usize,
    pub failed: usize,
    pub notified: usize,
}

enum Outcome {
    Enriched,
    Reused,
}

pub struct RefreshEngine {
    source: Arc<dyn RemoteSource>,
    enricher: Arc<dyn ContentEnricher>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn NotificationSink>,
    replica: Option<Arc<dyn ReplicaSink>>,
    cache: Arc<SnapshotCache>,
    cfg: RefreshConfig,
}

impl RefreshEngine {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        enricher: Arc<dyn ContentEnricher>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn NotificationSink>,
        cache: Arc<SnapshotCache>,
        cfg: RefreshConfig,
    ) -> Self {
        Self {
            source,
            enricher,
            ledger,
            notifier,
            replica: None,
            cache,
            cfg,
        }
    }

    pub fn with_replica(mut self, replica: Arc<dyn ReplicaSink>) -> Self {
        self.replica = Some(replica);
        self
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// Run one full cycle inside a `refresh_cycle` span with a fresh `job_id`.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let job_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("refresh_cycle", %job_id);
        self.cycle().instrument(span).await
    }

    async fn cycle(&self) -> Result<CycleReport> {
        let t0 = Instant::now();
        counter!("refresh_cycles_total").increment(1);
        info!(target: "refresh", event = "cycle_started");

        let mut ids = match self.source.ranked_ids().await.context("fetch ranking") {
            Ok(ids) => ids,
            Err(e) => {
                counter!("refresh_cycle_failures_total").increment(1);
                error!(target: "refresh", event = "cycle_failed", error = %format!("{e:#}"));
                return Err(e);
            }
        };
        ids.truncate(self.cfg.top_n);
        self.cache.replace_ranking(&ids);

        let mut report = CycleReport {
            ranked: ids.len(),
            ..Default::default()
        };

        for (i, &id) in ids.iter().enumerate() {
            if i > 0 && !self.cfg.item_delay.is_zero() {
                tokio::time::sleep(self.cfg.item_delay).await;
            }
            match self.process(id, &mut report).await {
                Ok(Outcome::Enriched) => report.enriched += 1,
                Ok(Outcome::Reused) => report.reused += 1,
                Err(e) => {
                    report.failed += 1;
                    counter!("refresh_item_failures_total").increment(1);
                    warn!(target: "refresh", event = "item_failed", story_id = id, error = %format!("{e:#}"));
                }
            }
        }

        let now = Utc::now();
        self.cache.set_last_updated(now);
        gauge!("refresh_last_completed_ts").set(now.timestamp() as f64);
        counter!("refresh_items_enriched_total").increment(report.enriched as u64);
        counter!("refresh_items_reused_total").increment(report.reused as u64);

        if let Some(replica) = &self.replica {
            // every ranked story still cached, stale entries included
            let mirrored: Vec<Item> = ids
                .iter()
                .filter_map(|id| self.cache.get(*id))
                .map(|e| e.item)
                .collect();
            if let Err(e) = replica.sync_top(&mirrored).await {
                warn!(target: "refresh", event = "replica_sync_failed", error = %format!("{e:#}"));
            }
        }

        info!(
            target: "refresh",
            event = "cycle_completed",
            ranked = report.ranked,
            enriched = report.enriched,
            reused = report.reused,
            failed = report.failed,
            notified = report.notified,
            duration_ms = t0.elapsed().as_millis() as u64,
        );
        Ok(report)
    }

    async fn process(&self, id: ItemId, report: &mut CycleReport) -> Result<Outcome> {
        let mut item = self.source.item(id).await.context("fetch item")?;
        if item.url.trim().is_empty() {
            item.url = self.source.item_page_url(id);
        }

        // reused entries are patched in place, never overwritten
        let (entry, outcome) = match self.cache.get(id) {
            Some(mut existing) if existing.item.url == item.url => {
                existing.refresh_counts(&item);
                debug!(target: "refresh", story_id = id, "reusing cached enrichment");
                (existing, Outcome::Reused)
            }
            _ => {
                let meta = match self.enricher.metadata(&item.url).await {
                    Ok(meta) => meta,
                    Err(e) => {
                        warn!(
                            target: "refresh",
                            event = "enrich_failed",
                            story_id = id,
                            error = %format!("{e:#}"),
                        );
                        Default::default()
                    }
                };
                (EnrichedItem::new(item.clone(), meta), Outcome::Enriched)
            }
        };

        let now = Utc::now();
        let seen = item.clone();
        if let Err(e) = self.with_ledger(move |l| l.upsert_item(&seen, now)).await {
            warn!(target: "refresh", event = "ledger_upsert_failed", story_id = id, error = %format!("{e:#}"));
        }
        if self.check_and_dispatch(&entry, now).await {
            report.notified += 1;
        }

        match outcome {
            Outcome::Reused => {
                self.cache.update(id, |e| e.refresh_counts(&item));
            }
            Outcome::Enriched => self.cache.upsert(id, entry),
        }
        Ok(outcome)
    }

    /// Run a synchronous ledger call on the blocking pool.
    async fn with_ledger<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Ledger) -> crate::error::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = self.ledger.clone();
        let res = tokio::task::spawn_blocking(move || f(ledger.as_ref()))
            .await
            .context("ledger task")?;
        Ok(res?)
    }

    /// Dispatch a detached notification if `entry` is eligible and mark it
    /// notified straight away, whatever the dispatch outcome.
    async fn check_and_dispatch(&self, entry: &EnrichedItem, now: chrono::DateTime<Utc>) -> bool {
        let id = entry.id();
        let policy = self.cfg.policy;
        match self.with_ledger(move |l| l.is_eligible(id, now, &policy)).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(target: "refresh", event = "eligibility_check_failed", story_id = id, error = %format!("{e:#}"));
                return false;
            }
        }

        info!(target: "refresh", event = "notification_triggered", story_id = id, score = entry.item.score);
        let sink = self.notifier.clone();
        let payload = entry.clone();
        tokio::spawn(async move {
            match sink.notify(&payload).await {
                Ok(()) => {
                    counter!("notifications_dispatched_total").increment(1);
                }
                Err(e) => {
                    counter!("notification_failures_total").increment(1);
                    warn!(
                        target: "notify",
                        event = "notification_failed",
                        sink = sink.name(),
                        story_id = payload.id(),
                        error = %format!("{e:#}"),
                    );
                }
            }
        });

        if let Err(e) = self.with_ledger(move |l| l.mark_notified(id, now)).await {
            error!(target: "refresh", event = "mark_notified_failed", story_id = id, error = %format!("{e:#}"));
        }
        true
    }
}
