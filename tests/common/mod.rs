//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{MockCarApi, TestCluster, NIGHTLY_IMPORT_CARS};
//!
//! #[tokio::test]
//! async fn test_sync() {
//!     let api = MockCarApi::start().await;
//!     let _mock = api.serve_cars(NIGHTLY_IMPORT_CARS).await;
//!     let cluster = TestCluster::new();
//!     let node = cluster.instance("node-a", &api.url());
//!     node.run_sync().await.unwrap();
//! }
//! ```

#![allow(dead_code)]

mod cluster;
mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use cluster::{TestCluster, TestInstance};
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{cars_json, silent_api_url, MockCarApi};
#[allow(unused_imports)]
pub use server::TestServer;
