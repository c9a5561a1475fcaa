// src/ledger/mod.rs
//! Durable per-story record backing the notify-once decision.

pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Item, ItemId};

pub use sqlite::SqliteLedger;

/// One row of the `stories` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub id: ItemId,
    pub title: String,
    pub url: String,
    /// Unix seconds; written on first insert, never overwritten.
    pub first_seen: i64,
    pub last_seen: i64,
    /// Running maximum of every score observed.
    pub max_score: i64,
    pub notified_at: Option<i64>,
}

/// Age and score thresholds a story must reach before it is pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityPolicy {
    pub min_age_secs: i64,
    pub min_score: i64,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            min_age_secs: 3600,
            min_score: 600,
        }
    }
}

impl EligibilityPolicy {
    /// Eligible iff never notified, old enough, and the running max is high enough.
    pub fn is_eligible(&self, record: &LedgerRecord, now: DateTime<Utc>) -> bool {
        if record.notified_at.is_some() {
            return false;
        }
        let age = now.timestamp() - record.first_seen;
        age >= self.min_age_secs && record.max_score >= self.min_score
    }
}

/// Storage contract the refresh engine depends on. All mutation goes through
/// `upsert_item` and `mark_notified`; the core never writes a record back after reading it.
pub trait Ledger: Send + Sync {
    /// Insert or merge: title/url overwritten, max score = max(old, new),
    /// first-seen preserved, last-seen bumped to `now`.
    fn upsert_item(&self, item: &Item, now: DateTime<Utc>) -> Result<()>;

    fn record(&self, id: ItemId) -> Result<Option<LedgerRecord>>;

    /// Set the notified timestamp. A record that is already marked keeps its original mark.
    fn mark_notified(&self, id: ItemId, now: DateTime<Utc>) -> Result<()>;

    /// Release the underlying storage handle. Later calls fail with `Error::Closed`.
    fn close(&self) -> Result<()>;

    /// Eligibility check against the stored record. Unknown ids are never eligible.
    fn is_eligible(&self, id: ItemId, now: DateTime<Utc>, policy: &EligibilityPolicy) -> Result<bool> {
        Ok(self
            .record(id)?
            .map(|r| policy.is_eligible(&r, now))
            .unwrap_or(false))
    }
}
