use serde::{Deserialize, Serialize};

/// A known-valid (manufacturer, model) pair as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub manufacturer: String,
    pub model: String,
}

/// A (manufacturer, model) pair as reported by the external source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarName {
    pub manufacturer: String,
    pub model: String,
}

impl CarName {
    pub fn new(manufacturer: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            model: model.into(),
        }
    }

    pub fn key(&self) -> NameKey {
        NameKey::new(&self.manufacturer, &self.model)
    }
}

/// Case-folded lookup key. Both the store's uniqueness constraint and the
/// validation cache go through this type, so they always agree on what
/// "the same name" means.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameKey {
    pub manufacturer: String,
    pub model: String,
}

impl NameKey {
    pub fn new(manufacturer: &str, model: &str) -> Self {
        Self {
            manufacturer: manufacturer.trim().to_lowercase(),
            model: model.trim().to_lowercase(),
        }
    }
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// One page of catalog entries ordered by id.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogPage {
    pub entries: Vec<CatalogEntry>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}
