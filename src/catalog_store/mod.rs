mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{CarName, CatalogEntry, CatalogPage, NameKey, UpsertOutcome};
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use store::SqliteCatalogStore;
pub use trait_def::CatalogStore;
