//! Test server lifecycle management
//!
//! Spawns the whole service the way `main` wires it: store, lock, cache,
//! HTTP fetcher, a running scheduler with the sync job, and the info server.

use super::constants::*;
use car_name_catalog::background_jobs::create_scheduler;
use car_name_catalog::background_jobs::jobs::{CarNameSyncJob, SyncSettings};
use car_name_catalog::background_jobs::{CronSpec, SchedulerHandle};
use car_name_catalog::cache::{CacheSettings, ValidationCache};
use car_name_catalog::catalog_store::SqliteCatalogStore;
use car_name_catalog::clock::{Clock, SystemClock};
use car_name_catalog::fetcher::HttpCarNameFetcher;
use car_name_catalog::lock::SqliteLockProvider;
use car_name_catalog::server::{serve, RequestsLoggingLevel, ServerConfig, ServerState};
use car_name_catalog::CarNameAdmission;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with an isolated database
///
/// When dropped, the server and scheduler shut down and the temp dir is removed.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    pub scheduler_handle: SchedulerHandle,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    shutdown_token: CancellationToken,
}

impl TestServer {
    /// Spawns a new server on a random port, syncing from `api_url`.
    ///
    /// The scheduler fires its startup hook right away, so the first sync
    /// starts while the server is coming up.
    pub async fn spawn(api_url: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("catalog.db");
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store =
            Arc::new(SqliteCatalogStore::new(&db_path).expect("Failed to open catalog store"));
        let lock = Arc::new(
            SqliteLockProvider::open(&db_path, clock.clone()).expect("Failed to open lock"),
        );
        let cache = Arc::new(ValidationCache::new(
            store.clone(),
            clock.clone(),
            CacheSettings::default(),
        ));
        let fetcher = Arc::new(
            HttpCarNameFetcher::new(api_url, TEST_FETCH_TIMEOUT).expect("Failed to create fetcher"),
        );
        let cron = CronSpec::parse("0 0 0 * * *", "Europe/Zagreb").unwrap();
        let job = Arc::new(CarNameSyncJob::new(
            fetcher,
            store.clone(),
            lock,
            cache.clone(),
            SyncSettings::new("test-server", TEST_LEASE, cron),
        ));

        let shutdown_token = CancellationToken::new();
        let (mut scheduler, scheduler_handle) = create_scheduler(clock, shutdown_token.clone());
        scheduler.register_job(job).await;
        tokio::spawn(async move { scheduler.run().await });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let state = ServerState {
            config: ServerConfig {
                port,
                requests_logging_level: RequestsLoggingLevel::None,
            },
            start_time: Instant::now(),
            catalog_store: store,
            admission: CarNameAdmission::new(cache),
            scheduler_handle: Some(scheduler_handle.clone()),
        };
        let server_shutdown = shutdown_token.clone();
        tokio::spawn(async move {
            serve(listener, state, server_shutdown)
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            scheduler_handle,
            _temp_dir: temp_dir,
            shutdown_token,
        };
        server.wait_for_ready().await;
        server
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Waits for the server to answer /health
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        while start.elapsed() < timeout {
            if let Ok(response) = client.get(self.url("/health")).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        panic!("Server did not become ready within {:?}", timeout);
    }

    /// Waits until the sync job has a finished run and returns its status
    pub async fn wait_for_sync(&self) -> String {
        let start = Instant::now();
        let timeout = Duration::from_millis(EVENTUAL_TIMEOUT_MS);

        while start.elapsed() < timeout {
            if let Some(job) = self.scheduler_handle.get_job(SYNC_JOB_ID).await {
                if let Some(run) = job.last_run {
                    if run.status != "running" {
                        return run.status;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        panic!("Sync did not finish within {:?}", timeout);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
