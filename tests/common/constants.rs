//! Shared constants for end-to-end tests

use std::time::Duration;

/// Path the fetcher requests on the external API
pub const CARS_PATH: &str = "/api/v1/cars.json";

/// The three cars of the initial import
pub const NIGHTLY_IMPORT_CARS: &[(&str, &str)] = &[
    ("Cadillac", "CTS Coupe"),
    ("Rolls-Royce", "Silver Spur"),
    ("Audi", "RS4"),
];

/// Lease used by every test instance
pub const TEST_LEASE: Duration = Duration::from_secs(10 * 60);

/// Fetch timeout for test instances, short so timeout scenarios stay fast
pub const TEST_FETCH_TIMEOUT: Duration = Duration::from_millis(500);

/// Lock name the sync job takes
pub const LOCK_NAME: &str = "car_name_sync";

/// Maximum time to wait for a spawned server to answer /health
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Maximum time to wait for background work to become visible
pub const EVENTUAL_TIMEOUT_MS: u64 = 5000;

/// Id the sync job is registered under
pub const SYNC_JOB_ID: &str = "car_name_sync";
