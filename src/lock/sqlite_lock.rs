use super::{LockAcquisition, LockProvider, LockRecord};
use crate::catalog_store::CATALOG_VERSIONED_SCHEMAS;
use crate::clock::Clock;
use crate::sqlite_persistence::{open_versioned_db, with_immediate_transaction};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Lease lock stored in the `sync_lock` table of the catalog database.
pub struct SqliteLockProvider {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
    /// Minimum time a lock stays held after acquisition, even if released earlier.
    min_hold: Duration,
}

impl SqliteLockProvider {
    /// Opens its own connection to the catalog database at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
            min_hold: Duration::ZERO,
        })
    }

    pub fn with_min_hold(mut self, min_hold: Duration) -> Self {
        self.min_hold = min_hold;
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Lock database connection mutex poisoned"))
    }

    fn millis_to_datetime(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::from_timestamp_millis(ms).ok_or_else(|| {
            rusqlite::Error::IntegralValueOutOfRange(0, ms)
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<LockRecord> {
        Ok(LockRecord {
            name: row.get("name")?,
            holder: row.get("holder")?,
            locked_at: Self::millis_to_datetime(row.get("locked_at")?)?,
            expires_at: Self::millis_to_datetime(row.get("expires_at")?)?,
        })
    }
}

impl LockProvider for SqliteLockProvider {
    fn try_acquire(&self, name: &str, holder: &str, lease: Duration) -> Result<LockAcquisition> {
        let now = self.clock.now();
        let lease = chrono::Duration::from_std(lease).context("Lease duration out of range")?;
        let expires_at = now + lease;

        let mut conn = self.conn()?;
        // An existing row is only overwritten once its lease has passed.
        let changed = with_immediate_transaction(&mut conn, |tx| {
            Ok(tx.execute(
                "INSERT INTO sync_lock (name, holder, locked_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (name) DO UPDATE SET
                    holder = excluded.holder,
                    locked_at = excluded.locked_at,
                    expires_at = excluded.expires_at
                 WHERE sync_lock.expires_at < excluded.locked_at",
                params![
                    name,
                    holder,
                    now.timestamp_millis(),
                    expires_at.timestamp_millis()
                ],
            )?)
        })
        .with_context(|| format!("Failed to acquire lock {}", name))?;

        if changed == 1 {
            debug!("Lock {} granted to {} until {}", name, holder, expires_at);
            Ok(LockAcquisition::Granted(LockRecord {
                name: name.to_string(),
                holder: holder.to_string(),
                locked_at: now,
                expires_at,
            }))
        } else {
            Ok(LockAcquisition::AlreadyHeld)
        }
    }

    fn release(&self, name: &str, holder: &str) -> Result<bool> {
        let now_ms = self.clock.now().timestamp_millis();
        let min_hold_ms = self.min_hold.as_millis() as i64;
        let mut conn = self.conn()?;
        let changed = with_immediate_transaction(&mut conn, |tx| {
            let changed = if min_hold_ms == 0 {
                tx.execute(
                    "DELETE FROM sync_lock WHERE name = ?1 AND holder = ?2",
                    params![name, holder],
                )?
            } else {
                // Keep the row until locked_at + min_hold, never past the original lease.
                tx.execute(
                    "UPDATE sync_lock
                     SET expires_at = MIN(expires_at, MAX(?3, locked_at + ?4))
                     WHERE name = ?1 AND holder = ?2",
                    params![name, holder, now_ms, min_hold_ms],
                )?
            };
            Ok(changed)
        })
        .with_context(|| format!("Failed to release lock {}", name))?;

        if changed == 0 {
            debug!("Lock {} no longer held by {}, nothing to release", name, holder);
        }
        Ok(changed == 1)
    }

    fn current_holder(&self, name: &str) -> Result<Option<LockRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT name, holder, locked_at, expires_at FROM sync_lock
             WHERE name = ?1 AND expires_at >= ?2",
            params![name, self.clock.now().timestamp_millis()],
            Self::row_to_record,
        )
        .optional()
        .with_context(|| format!("Failed to read lock {}", name))
    }
}
