use super::models::{CatalogEntry, CatalogPage, NameKey, UpsertOutcome};
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::CatalogStore;
use crate::sqlite_persistence::{open_versioned_db, with_immediate_transaction};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Catalog database connection mutex poisoned"))
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CatalogEntry> {
        Ok(CatalogEntry {
            id: row.get("id")?,
            manufacturer: row.get("manufacturer")?,
            model: row.get("model")?,
        })
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn upsert(&self, manufacturer: &str, model: &str) -> Result<UpsertOutcome> {
        let key = NameKey::new(manufacturer, model);
        let mut conn = self.conn()?;
        let changed = with_immediate_transaction(&mut conn, |tx| {
            Ok(tx.execute(
                "INSERT INTO car_name (manufacturer, model, manufacturer_key, model_key)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (manufacturer_key, model_key) DO NOTHING",
                params![manufacturer, model, key.manufacturer, key.model],
            )?)
        })
        .with_context(|| format!("Failed to upsert car name {} {}", manufacturer, model))?;

        Ok(if changed == 1 {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::AlreadyPresent
        })
    }

    fn find_ignore_case(&self, manufacturer: &str, model: &str) -> Result<Option<CatalogEntry>> {
        let key = NameKey::new(manufacturer, model);
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, manufacturer, model FROM car_name
             WHERE manufacturer_key = ?1 AND model_key = ?2",
            params![key.manufacturer, key.model],
            Self::row_to_entry,
        )
        .optional()
        .context("Failed to look up car name")
    }

    fn list(&self, page: usize, size: usize) -> Result<CatalogPage> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM car_name", [], |row| row.get(0))?;
        // A page past anything SQLite can address is simply past the end
        let bounds = page
            .checked_mul(size)
            .and_then(|offset| i64::try_from(offset).ok())
            .zip(i64::try_from(size).ok());
        let entries = match bounds {
            Some((offset, limit)) => {
                let mut stmt = conn.prepare(
                    "SELECT id, manufacturer, model FROM car_name ORDER BY id LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt
                    .query_map(params![limit, offset], Self::row_to_entry)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .context("Failed to list car names")?;
                rows
            }
            None => Vec::new(),
        };

        Ok(CatalogPage {
            entries,
            page,
            size,
            total: total as usize,
        })
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM car_name", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
