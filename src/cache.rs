//! # Snapshot cache
//! Thread-safe store of the current ranking plus one enriched entry per ranked id.
//!
//! Each public call is its own critical section: readers never see a half-applied
//! `replace_ranking`, but a refresh in progress is visible as a sequence of
//! discrete updates (ranking first, then entries one by one).

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::types::{EnrichedItem, ItemId};

#[derive(Debug, Default)]
pub struct SnapshotCache {
    inner: RwLock<Inner>,
    last_updated: RwLock<Option<DateTime<Utc>>>,
}

#[derive(Debug, Default)]
struct Inner {
    ranking: Vec<ItemId>,
    items: HashMap<ItemId, EnrichedItem>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Swap the ranking and drop every entry whose id is no longer ranked.
    pub fn replace_ranking(&self, ids: &[ItemId]) {
        let keep: HashSet<ItemId> = ids.iter().copied().collect();
        let mut inner = self.write();
        inner.items.retain(|id, _| {
            let ranked = keep.contains(id);
            if !ranked {
                debug!(target: "cache", story_id = id, "removing story from cache");
            }
            ranked
        });
        inner.ranking = ids.to_vec();
    }

    /// Insert or fully replace one entry. Does not touch the ranking.
    pub fn upsert(&self, id: ItemId, item: EnrichedItem) {
        self.write().items.insert(id, item);
    }

    /// Patch an existing entry in place. Returns `false` (and does nothing) if the
    /// id is not cached, so a pruned id is never brought back.
    pub fn update<F>(&self, id: ItemId, f: F) -> bool
    where
        F: FnOnce(&mut EnrichedItem),
    {
        match self.write().items.get_mut(&id) {
            Some(entry) => {
                f(entry);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: ItemId) -> Option<EnrichedItem> {
        self.read().items.get(&id).cloned()
    }

    /// Entries in ranking order; ranked ids without an entry are skipped.
    pub fn get_all(&self) -> Vec<EnrichedItem> {
        let inner = self.read();
        let mut out = Vec::with_capacity(inner.ranking.len());
        for id in &inner.ranking {
            match inner.items.get(id) {
                Some(entry) => out.push(entry.clone()),
                None => warn!(target: "cache", story_id = id, "story not found in cache"),
            }
        }
        out
    }

    pub fn ranking(&self) -> Vec<ItemId> {
        self.read().ranking.clone()
    }

    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_last_updated(&self, t: DateTime<Utc>) {
        *self.last_updated.write().unwrap_or_else(|p| p.into_inner()) = Some(t);
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.read().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Item, SecondaryMetadata};

    fn entry(id: ItemId) -> EnrichedItem {
        EnrichedItem::new(
            Item {
                id,
                title: format!("story {id}"),
                url: format!("https://example.com/{id}"),
                ..Default::default()
            },
            SecondaryMetadata::default(),
        )
    }

    #[test]
    fn replace_ranking_prunes_orphans() {
        let c = SnapshotCache::new();
        c.replace_ranking(&[1, 2, 3]);
        for id in [1, 2, 3] {
            c.upsert(id, entry(id));
        }
        c.replace_ranking(&[2, 4]);
        assert!(c.get(1).is_none());
        assert!(c.get(3).is_none());
        assert!(c.get(2).is_some());
        assert_eq!(c.len(), 1);
        assert_eq!(c.ranking(), vec![2, 4]);
    }

    #[test]
    fn replace_ranking_same_list_keeps_everything() {
        let c = SnapshotCache::new();
        c.replace_ranking(&[7, 8]);
        c.upsert(7, entry(7));
        c.upsert(8, entry(8));
        c.replace_ranking(&[7, 8]);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn replace_ranking_leaves_last_updated_alone() {
        let c = SnapshotCache::new();
        assert!(c.last_updated().is_none());
        let t = Utc::now();
        c.set_last_updated(t);
        c.replace_ranking(&[1]);
        assert_eq!(c.last_updated(), Some(t));
    }

    #[test]
    fn upsert_then_get_returns_written_value() {
        let c = SnapshotCache::new();
        let mut e = entry(9);
        e.og_description = Some("desc".into());
        c.upsert(9, e.clone());
        c.upsert(9, e.clone());
        assert_eq!(c.get(9), Some(e));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn get_all_follows_ranking_and_skips_missing() {
        let c = SnapshotCache::new();
        c.replace_ranking(&[3, 1, 2]);
        c.upsert(2, entry(2));
        c.upsert(3, entry(3));
        let ids: Vec<_> = c.get_all().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn unranked_upsert_is_pruned_by_next_ranking() {
        let c = SnapshotCache::new();
        c.replace_ranking(&[1]);
        c.upsert(50, entry(50));
        assert!(c.get(50).is_some());
        assert!(c.get_all().is_empty());
        c.replace_ranking(&[1]);
        assert!(c.get(50).is_none());
    }

    #[test]
    fn update_does_not_resurrect() {
        let c = SnapshotCache::new();
        assert!(!c.update(5, |e| e.summary = Some("x".into())));
        assert!(c.get(5).is_none());
        c.upsert(5, entry(5));
        assert!(c.update(5, |e| e.summary = Some("x".into())));
        assert_eq!(c.get(5).and_then(|e| e.summary).as_deref(), Some("x"));
    }
}
