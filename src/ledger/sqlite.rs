use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ledger::{Ledger, LedgerRecord};
use crate::types::{Item, ItemId};

/// SQLite-backed ledger. A single connection serialised behind a mutex.
pub struct SqliteLedger {
    conn: Mutex<Option<Connection>>,
}

impl SqliteLedger {
    /// Open (creating parent directories and the file if needed) and migrate.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let ledger = Self::init(conn)?;
        info!(target: "db", db_path = %path.display(), "database opened");
        Ok(ledger)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        // journal_mode answers with the resulting mode ("memory" for in-memory dbs)
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);
        migrations.to_latest(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        f(conn)
    }
}

impl Ledger for SqliteLedger {
    fn upsert_item(&self, item: &Item, now: DateTime<Utc>) -> Result<()> {
        let now = now.timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO stories (hn_id, title, url, created_at, last_seen_at, max_points)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(hn_id) DO UPDATE SET
                    title = excluded.title,
                    url = excluded.url,
                    last_seen_at = excluded.last_seen_at,
                    max_points = MAX(max_points, excluded.max_points)",
                params![item.id as i64, item.title, item.url, item.time, now, item.score],
            )?;
            Ok(())
        })?;
        debug!(target: "db", story_id = item.id, "upserted story");
        Ok(())
    }

    fn record(&self, id: ItemId) -> Result<Option<LedgerRecord>> {
        self.with_conn(|conn| {
            let rec = conn
                .query_row(
                    "SELECT hn_id, title, url, created_at, last_seen_at, max_points, notified_at
                     FROM stories WHERE hn_id = ?1",
                    params![id as i64],
                    |row| {
                        Ok(LedgerRecord {
                            id: row.get::<_, i64>(0)? as ItemId,
                            title: row.get(1)?,
                            url: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                            first_seen: row.get(3)?,
                            last_seen: row.get(4)?,
                            max_score: row.get(5)?,
                            notified_at: row.get(6)?,
                        })
                    },
                )
                .optional()?;
            Ok(rec)
        })
    }

    fn mark_notified(&self, id: ItemId, now: DateTime<Utc>) -> Result<()> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE stories SET notified_at = ?1 WHERE hn_id = ?2 AND notified_at IS NULL",
                params![now.timestamp(), id as i64],
            )?)
        })?;
        debug!(target: "db", story_id = id, changed, "marked story as notified");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let conn = self.lock().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| Error::Database(e))?;
            info!(target: "db", "database closed");
        }
        Ok(())
    }
}
