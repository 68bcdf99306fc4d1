//! Admission check for records that reference a car name.

use crate::cache::ValidationCache;
use crate::catalog_store::CatalogEntry;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Manufacturer and model must not be blank")]
    BlankName,

    #[error("Manufacturer or model not supported")]
    UnknownCarName,

    #[error("Failed to look up car name: {0:#}")]
    Lookup(anyhow::Error),
}

/// Accepts a (manufacturer, model) pair only if the catalog knows it.
///
/// A name the next sync would add is rejected the same way as one that will
/// never exist.
#[derive(Clone)]
pub struct CarNameAdmission {
    cache: Arc<ValidationCache>,
}

impl CarNameAdmission {
    pub fn new(cache: Arc<ValidationCache>) -> Self {
        Self { cache }
    }

    pub fn admit(&self, manufacturer: &str, model: &str) -> Result<CatalogEntry, AdmissionError> {
        let manufacturer = manufacturer.trim();
        let model = model.trim();
        if manufacturer.is_empty() || model.is_empty() {
            return Err(AdmissionError::BlankName);
        }

        self.cache
            .lookup(manufacturer, model)
            .map_err(AdmissionError::Lookup)?
            .ok_or(AdmissionError::UnknownCarName)
    }
}
