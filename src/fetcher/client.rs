//! HTTP client for the external car name API.

use super::models::CarNameApiResponse;
use super::{CarNameFetcher, FetchError};
use crate::catalog_store::CarName;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::debug;

const CARS_PATH: &str = "/api/v1/cars.json";

pub struct HttpCarNameFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCarNameFetcher {
    /// Create a new fetcher.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the car name API (e.g., "http://localhost:8080")
    /// * `timeout` - Bound on the whole request, including reading the body
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_transport_error(err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err.to_string())
        }
    }

    fn parse(body: &str) -> Result<Vec<CarName>, FetchError> {
        let response: CarNameApiResponse = serde_json::from_str(body)
            .map_err(|e| FetchError::MalformedPayload(e.to_string()))?;

        response
            .data
            .iter()
            .enumerate()
            .map(|(index, record)| {
                if record.manufacturer.trim().is_empty() || record.model.trim().is_empty() {
                    Err(FetchError::MalformedPayload(format!(
                        "record {} has a blank manufacturer or model",
                        index
                    )))
                } else {
                    Ok(record.to_car_name())
                }
            })
            .collect()
    }
}

#[async_trait]
impl CarNameFetcher for HttpCarNameFetcher {
    async fn fetch(&self) -> Result<Vec<CarName>, FetchError> {
        let url = format!("{}{}", self.base_url, CARS_PATH);
        debug!("Fetching car names from {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(Self::map_transport_error)?;
        let names = Self::parse(&body)?;
        debug!("Fetched {} car names", names.len());
        Ok(names)
    }
}
