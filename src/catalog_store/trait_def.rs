//! CatalogStore trait definition.

use super::models::{CatalogEntry, CatalogPage, UpsertOutcome};
use anyhow::Result;

/// Durable, append-only catalog of car names.
///
/// Implementations must enforce uniqueness on the case-folded
/// (manufacturer, model) pair at the storage layer.
pub trait CatalogStore: Send + Sync {
    /// Insert the pair unless a case-insensitive match already exists.
    ///
    /// A concurrent insert of the same pair is not an error; the loser
    /// observes `UpsertOutcome::AlreadyPresent`.
    fn upsert(&self, manufacturer: &str, model: &str) -> Result<UpsertOutcome>;

    /// Case-insensitive exact lookup.
    fn find_ignore_case(&self, manufacturer: &str, model: &str) -> Result<Option<CatalogEntry>>;

    /// Entries ordered by id, `page` is zero-based.
    fn list(&self, page: usize, size: usize) -> Result<CatalogPage>;

    fn count(&self) -> Result<usize>;
}
