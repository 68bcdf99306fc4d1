//! Wire types for the external car name API.

use crate::catalog_store::CarName;
use serde::Deserialize;

/// Response body of `GET /api/v1/cars.json`.
#[derive(Clone, Debug, Deserialize)]
pub struct CarNameApiResponse {
    pub data: Vec<CarNameDescription>,
}

/// One record of the response. Any other fields the API sends are ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct CarNameDescription {
    pub manufacturer: String,
    #[serde(rename = "model_name")]
    pub model: String,
}

impl CarNameDescription {
    /// Surrounding whitespace from the source is not part of the name.
    pub fn to_car_name(&self) -> CarName {
        CarName::new(self.manufacturer.trim(), self.model.trim())
    }
}
