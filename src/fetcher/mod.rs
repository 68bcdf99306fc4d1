//! Source of truth for car names.

mod client;
mod models;

pub use client::HttpCarNameFetcher;
pub use models::{CarNameApiResponse, CarNameDescription};

use crate::catalog_store::CarName;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Car name API request timed out")]
    Timeout,

    #[error("Failed to reach car name API: {0}")]
    Network(String),

    #[error("Car name API responded with status {0}")]
    Status(u16),

    #[error("Malformed car name API payload: {0}")]
    MalformedPayload(String),
}

/// Returns the full current list of known car names.
///
/// Implementations must not mutate any state, and must reject the whole
/// response rather than return a partial list.
#[async_trait]
pub trait CarNameFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Vec<CarName>, FetchError>;
}
