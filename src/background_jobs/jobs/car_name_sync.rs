//! Car name synchronization job.
//!
//! Pulls the full list of known car names from the external API and merges it
//! into the shared catalog. Every instance schedules this job, and the
//! cluster-wide lease lock lets only one of them get past acquisition:
//!
//! ```text
//! Idle → Acquiring → Fetching → Merging → Evicting → Releasing → Idle
//!                                                       ↑
//!        (any failure) ──────────────── Aborted ────────┘
//! ```
//!
//! A run that cannot get the lock is a normal skip. A failed fetch changes
//! nothing and is retried by the next scheduled run. The lock is released on
//! every path that acquired it.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, CronSpec, HookEvent, JobError, JobSchedule, ShutdownBehavior},
};
use crate::cache::ValidationCache;
use crate::catalog_store::{CarName, CatalogStore, UpsertOutcome};
use crate::fetcher::{CarNameFetcher, FetchError};
use crate::lock::{LockAcquisition, LockProvider};
use crate::server::metrics;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SYNC_LOCK_NAME: &str = "car_name_sync";

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub lock_name: String,
    /// Must exceed the fetch timeout plus the worst-case merge time.
    pub lease: Duration,
    /// Prefix of the lock holder token, unique per process.
    pub instance_id: String,
    pub cron: CronSpec,
}

impl SyncSettings {
    pub fn new(instance_id: impl Into<String>, lease: Duration, cron: CronSpec) -> Self {
        Self {
            lock_name: SYNC_LOCK_NAME.to_string(),
            lease,
            instance_id: instance_id.into(),
            cron,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncPhase {
    Idle,
    Acquiring,
    Fetching,
    Merging,
    Evicting,
    Releasing,
    Aborted,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "Idle",
            SyncPhase::Acquiring => "Acquiring",
            SyncPhase::Fetching => "Fetching",
            SyncPhase::Merging => "Merging",
            SyncPhase::Evicting => "Evicting",
            SyncPhase::Releasing => "Releasing",
            SyncPhase::Aborted => "Aborted",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub fetched: usize,
    pub inserted: usize,
    pub already_present: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another instance holds the lock.
    Skipped,
    Completed(SyncReport),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Unexpected sync failure: {0:#}")]
    Unexpected(anyhow::Error),

    #[error("Sync was cancelled")]
    Cancelled,
}

pub struct CarNameSyncJob {
    fetcher: Arc<dyn CarNameFetcher>,
    store: Arc<dyn CatalogStore>,
    lock: Arc<dyn LockProvider>,
    cache: Arc<ValidationCache>,
    settings: SyncSettings,
}

impl CarNameSyncJob {
    pub fn new(
        fetcher: Arc<dyn CarNameFetcher>,
        store: Arc<dyn CatalogStore>,
        lock: Arc<dyn LockProvider>,
        cache: Arc<ValidationCache>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            fetcher,
            store,
            lock,
            cache,
            settings,
        }
    }

    /// One full pass of the state machine.
    pub async fn run_once(&self, ctx: &JobContext) -> Result<SyncOutcome, SyncError> {
        let holder = format!("{}:{}", self.settings.instance_id, Uuid::new_v4());
        let mut phase = SyncPhase::Idle;
        advance(&mut phase, SyncPhase::Acquiring);

        let acquisition = {
            let lock = Arc::clone(&self.lock);
            let name = self.settings.lock_name.clone();
            let holder = holder.clone();
            let lease = self.settings.lease;
            run_blocking(move || lock.try_acquire(&name, &holder, lease)).await
        };

        let record = match acquisition {
            Ok(LockAcquisition::Granted(record)) => record,
            Ok(LockAcquisition::AlreadyHeld) => {
                debug!(
                    "Lock {} held by another instance, skipping sync",
                    self.settings.lock_name
                );
                advance(&mut phase, SyncPhase::Idle);
                metrics::record_sync_run("skipped");
                return Ok(SyncOutcome::Skipped);
            }
            Err(e) => {
                advance(&mut phase, SyncPhase::Aborted);
                metrics::record_sync_run("failed");
                return Err(e);
            }
        };
        debug!("Acquired lock {} until {}", record.name, record.expires_at);

        let started = Instant::now();
        let result = self.run_locked(ctx, &mut phase).await;
        if result.is_err() {
            advance(&mut phase, SyncPhase::Aborted);
        }

        advance(&mut phase, SyncPhase::Releasing);
        self.release(&holder).await;
        advance(&mut phase, SyncPhase::Idle);

        match &result {
            Ok(report) => {
                metrics::record_sync_run("completed");
                metrics::record_sync_merge(
                    report.inserted,
                    report.already_present,
                    started.elapsed(),
                );
                info!(
                    "Car name sync completed: fetched {}, inserted {}, already present {}",
                    report.fetched, report.inserted, report.already_present
                );
            }
            Err(SyncError::Fetch(e)) => {
                metrics::record_sync_run("failed");
                warn!("Car name sync aborted, fetch failed: {}", e);
            }
            Err(e) => {
                metrics::record_sync_run("failed");
                warn!("Car name sync aborted: {}", e);
            }
        }

        result.map(SyncOutcome::Completed)
    }

    /// Fetching, Merging and Evicting. Only called while holding the lock.
    async fn run_locked(
        &self,
        ctx: &JobContext,
        phase: &mut SyncPhase,
    ) -> Result<SyncReport, SyncError> {
        if ctx.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        advance(phase, SyncPhase::Fetching);
        let names = self.fetcher.fetch().await?;
        let fetched = names.len();

        advance(phase, SyncPhase::Merging);
        let (inserted, already_present) = {
            let store = Arc::clone(&self.store);
            let token = ctx.cancellation_token.clone();
            tokio::task::spawn_blocking(move || merge_all(store.as_ref(), &names, &token))
                .await
                .map_err(|e| SyncError::Unexpected(anyhow!("Merge task failed: {}", e)))??
        };

        advance(phase, SyncPhase::Evicting);
        self.cache.evict_all();

        Ok(SyncReport {
            fetched,
            inserted,
            already_present,
        })
    }

    async fn release(&self, holder: &str) {
        let lock = Arc::clone(&self.lock);
        let name = self.settings.lock_name.clone();
        let holder_owned = holder.to_string();
        match run_blocking(move || lock.release(&name, &holder_owned)).await {
            Ok(true) => debug!("Released lock {}", self.settings.lock_name),
            Ok(false) => debug!(
                "Lock {} was no longer held by {}",
                self.settings.lock_name, holder
            ),
            // The lease runs out on its own
            Err(e) => warn!("Failed to release lock {}: {}", self.settings.lock_name, e),
        }
    }
}

fn advance(phase: &mut SyncPhase, to: SyncPhase) {
    debug!("Car name sync: {} -> {}", phase, to);
    *phase = to;
}

fn merge_all(
    store: &dyn CatalogStore,
    names: &[CarName],
    token: &CancellationToken,
) -> Result<(usize, usize), SyncError> {
    let mut inserted = 0;
    let mut already_present = 0;

    for name in names {
        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let outcome = store
            .upsert(&name.manufacturer, &name.model)
            .map_err(SyncError::Unexpected)?;
        match outcome {
            UpsertOutcome::Inserted => {
                debug!("Added car name {} {}", name.manufacturer, name.model);
                inserted += 1;
            }
            UpsertOutcome::AlreadyPresent => already_present += 1,
        }
    }

    match store.count() {
        Ok(count) => metrics::set_catalog_entries(count),
        Err(e) => debug!("Could not count catalog entries: {}", e),
    }
    Ok((inserted, already_present))
}

async fn run_blocking<T, F>(f: F) -> Result<T, SyncError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Blocking task failed")
        .and_then(|result| result)
        .map_err(SyncError::Unexpected)
}

#[async_trait]
impl BackgroundJob for CarNameSyncJob {
    fn id(&self) -> &'static str {
        "car_name_sync"
    }

    fn name(&self) -> &'static str {
        "Car Name Sync"
    }

    fn description(&self) -> &'static str {
        "Merge car names from the external API into the catalog"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Combined {
            cron: Some(self.settings.cron.clone()),
            interval: None,
            hooks: vec![HookEvent::OnStartup],
        }
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        // Merges are idempotent, the next run picks up where this one stopped
        ShutdownBehavior::Cancellable
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        match self.run_once(ctx).await {
            Ok(_) => Ok(()),
            Err(SyncError::Cancelled) => Err(JobError::Cancelled),
            Err(e) => Err(JobError::ExecutionFailed(e.to_string())),
        }
    }
}
