//! Several catalog instances sharing one database
//!
//! Every instance has its own store connection, lock provider, cache and
//! sync job, exactly like separate processes would. They share only the
//! database file and a manual clock so lease expiry can be driven by tests.

use super::constants::*;
use car_name_catalog::background_jobs::jobs::{
    CarNameSyncJob, SyncError, SyncOutcome, SyncSettings,
};
use car_name_catalog::background_jobs::{CronSpec, JobContext};
use car_name_catalog::cache::{CacheSettings, ValidationCache};
use car_name_catalog::catalog_store::{CatalogStore, SqliteCatalogStore};
use car_name_catalog::clock::ManualClock;
use car_name_catalog::fetcher::HttpCarNameFetcher;
use car_name_catalog::lock::SqliteLockProvider;
use car_name_catalog::CarNameAdmission;
use chrono::{TimeZone, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub struct TestCluster {
    pub db_path: PathBuf,
    pub clock: Arc<ManualClock>,
    _temp_dir: TempDir,
}

impl TestCluster {
    /// Creates an empty shared database. The clock starts at midnight in
    /// Zagreb on 2024-05-02, the moment the nightly sync fires.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("catalog.db");
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap(),
        ));
        Self {
            db_path,
            clock,
            _temp_dir: temp_dir,
        }
    }

    /// Starts another instance fetching from `api_url`
    pub fn instance(&self, instance_id: &str, api_url: &str) -> TestInstance {
        let store = Arc::new(
            SqliteCatalogStore::new(&self.db_path).expect("Failed to open catalog store"),
        );
        let lock = Arc::new(
            SqliteLockProvider::open(&self.db_path, self.clock.clone())
                .expect("Failed to open lock provider"),
        );
        let cache = Arc::new(ValidationCache::new(
            store.clone(),
            self.clock.clone(),
            CacheSettings::default(),
        ));
        let fetcher = Arc::new(
            HttpCarNameFetcher::new(api_url, TEST_FETCH_TIMEOUT)
                .expect("Failed to create fetcher"),
        );
        let cron = CronSpec::parse("0 0 0 * * *", "Europe/Zagreb").unwrap();
        let job = CarNameSyncJob::new(
            fetcher,
            store.clone(),
            lock.clone(),
            cache.clone(),
            SyncSettings::new(instance_id, TEST_LEASE, cron),
        );

        TestInstance {
            instance_id: instance_id.to_string(),
            store,
            lock,
            cache: cache.clone(),
            admission: CarNameAdmission::new(cache),
            job,
        }
    }
}

pub struct TestInstance {
    pub instance_id: String,
    pub store: Arc<SqliteCatalogStore>,
    pub lock: Arc<SqliteLockProvider>,
    pub cache: Arc<ValidationCache>,
    pub admission: CarNameAdmission,
    pub job: CarNameSyncJob,
}

impl TestInstance {
    /// Runs one scheduled tick of the sync job
    pub async fn run_sync(&self) -> Result<SyncOutcome, SyncError> {
        let ctx = JobContext::new(CancellationToken::new(), "schedule");
        self.job.run_once(&ctx).await
    }

    /// All catalog entries as (manufacturer, model) pairs in id order
    pub fn catalog(&self) -> Vec<(String, String)> {
        self.store
            .list(0, 1000)
            .expect("Failed to list catalog")
            .entries
            .into_iter()
            .map(|e| (e.manufacturer, e.model))
            .collect()
    }
}
