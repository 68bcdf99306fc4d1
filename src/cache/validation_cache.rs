use crate::catalog_store::{CatalogEntry, CatalogStore, NameKey};
use crate::clock::Clock;
use crate::server::metrics;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct CacheSettings {
    /// Upper bound on cached entries. The oldest entry goes first when full.
    pub max_entries: Option<usize>,
    /// Entries older than this are reloaded from the store.
    pub ttl: Option<Duration>,
}

struct CachedEntry {
    entry: CatalogEntry,
    cached_at: DateTime<Utc>,
}

/// Read-through cache in front of [`CatalogStore::find_ignore_case`].
///
/// Only positive results are kept. A name that is missing now may be added by
/// the next sync, and nothing would invalidate a cached miss.
pub struct ValidationCache {
    store: Arc<dyn CatalogStore>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    entries: RwLock<HashMap<NameKey, CachedEntry>>,
}

impl ValidationCache {
    pub fn new(store: Arc<dyn CatalogStore>, clock: Arc<dyn Clock>, settings: CacheSettings) -> Self {
        Self {
            store,
            clock,
            settings,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<NameKey, CachedEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<NameKey, CachedEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn is_fresh(&self, cached: &CachedEntry, now: DateTime<Utc>) -> bool {
        match self.settings.ttl {
            None => true,
            Some(ttl) => match chrono::Duration::from_std(ttl) {
                Ok(ttl) => now - cached.cached_at < ttl,
                Err(_) => true,
            },
        }
    }

    pub fn lookup(&self, manufacturer: &str, model: &str) -> Result<Option<CatalogEntry>> {
        let key = NameKey::new(manufacturer, model);
        let now = self.clock.now();

        if let Some(cached) = self.read().get(&key) {
            if self.is_fresh(cached, now) {
                metrics::record_cache_hit();
                return Ok(Some(cached.entry.clone()));
            }
        }

        metrics::record_cache_miss();
        let found = self.store.find_ignore_case(manufacturer, model)?;

        match &found {
            Some(entry) => self.insert(key, entry.clone(), now),
            None => {
                // Drop any stale positive so the store stays authoritative
                let mut entries = self.write();
                if entries.remove(&key).is_some() {
                    metrics::set_cache_entries(entries.len());
                }
            }
        }
        Ok(found)
    }

    fn insert(&self, key: NameKey, entry: CatalogEntry, now: DateTime<Utc>) {
        let mut entries = self.write();
        if let Some(max) = self.settings.max_entries {
            if max == 0 {
                return;
            }
            if !entries.contains_key(&key) && entries.len() >= max {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, cached)| cached.cached_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            key,
            CachedEntry {
                entry,
                cached_at: now,
            },
        );
        metrics::set_cache_entries(entries.len());
    }

    /// Drop every cached entry.
    pub fn evict_all(&self) {
        let mut entries = self.write();
        let evicted = entries.len();
        entries.clear();
        metrics::set_cache_entries(0);
        debug!("Evicted {} validation cache entries", evicted);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
