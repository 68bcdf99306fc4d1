//! Car Name Catalog Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod admission;
pub mod background_jobs;
pub mod cache;
pub mod catalog_store;
pub mod clock;
pub mod config;
pub mod fetcher;
pub mod lock;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use admission::{AdmissionError, CarNameAdmission};
pub use cache::{CacheSettings, ValidationCache};
pub use catalog_store::{CatalogStore, SqliteCatalogStore};
pub use server::{run_server, RequestsLoggingLevel};
