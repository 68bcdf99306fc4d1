//! External API doubles

use super::constants::CARS_PATH;
use mockito::{Mock, ServerGuard};
use serde_json::json;
use tokio::net::TcpListener;

/// Renders the external API payload for the given (manufacturer, model) pairs
pub fn cars_json(cars: &[(&str, &str)]) -> String {
    let data: Vec<_> = cars
        .iter()
        .map(|(manufacturer, model)| {
            json!({
                "manufacturer": manufacturer,
                "model_name": model,
            })
        })
        .collect();
    json!({ "data": data }).to_string()
}

/// Mock of the external car name API
pub struct MockCarApi {
    server: ServerGuard,
}

impl MockCarApi {
    pub async fn start() -> Self {
        Self {
            server: mockito::Server::new_async().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Answers every fetch with the given cars
    pub async fn serve_cars(&mut self, cars: &[(&str, &str)]) -> Mock {
        self.cars_mock(cars).create_async().await
    }

    /// Like [`serve_cars`](Self::serve_cars), asserting exactly `hits` fetches
    pub async fn serve_cars_expecting(&mut self, cars: &[(&str, &str)], hits: usize) -> Mock {
        self.cars_mock(cars).expect(hits).create_async().await
    }

    fn cars_mock(&mut self, cars: &[(&str, &str)]) -> Mock {
        self.server
            .mock("GET", CARS_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(cars_json(cars))
    }

    /// Answers every fetch with the given status and no useful body
    pub async fn fail_with(&mut self, status: usize) -> Mock {
        self.server
            .mock("GET", CARS_PATH)
            .with_status(status)
            .with_body("upstream unavailable")
            .create_async()
            .await
    }
}

/// An address that accepts connections but never answers, so every fetch
/// against it runs into the client timeout.
///
/// The listener must be kept alive for as long as the URL is used.
pub async fn silent_api_url() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind silent listener");
    let addr = listener.local_addr().expect("Failed to get local address");
    (listener, format!("http://{}", addr))
}
