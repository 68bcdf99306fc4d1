use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use car_name_catalog::background_jobs::jobs::{CarNameSyncJob, SyncSettings};
use car_name_catalog::background_jobs::create_scheduler;
use car_name_catalog::cache::ValidationCache;
use car_name_catalog::catalog_store::{CatalogStore, SqliteCatalogStore};
use car_name_catalog::clock::{Clock, SystemClock};
use car_name_catalog::config::{AppConfig, CliConfig, FileConfig, DEFAULT_FETCH_TIMEOUT_SEC};
use car_name_catalog::fetcher::HttpCarNameFetcher;
use car_name_catalog::lock::SqliteLockProvider;
use car_name_catalog::server::{self, run_server, RequestsLoggingLevel, ServerConfig, ServerState};
use car_name_catalog::CarNameAdmission;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the catalog database (shared by every instance).
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// Base URL of the external car name API.
    #[clap(long)]
    pub car_name_api_url: Option<String>,

    /// Timeout in seconds for a single fetch from the car name API.
    #[clap(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SEC)]
    pub fetch_timeout_sec: u64,

    /// Identifier of this instance, used as the lock holder prefix.
    /// Defaults to $HOSTNAME.
    #[clap(long)]
    pub instance_id: Option<String>,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            port: self.port,
            car_name_api_url: self.car_name_api_url.clone(),
            fetch_timeout_sec: self.fetch_timeout_sec,
            instance_id: self.instance_id.clone(),
            logging_level: self.logging_level.clone(),
        }
    }
}

async fn wait_for_shutdown_signal(shutdown_token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
    shutdown_token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    info!(
        "Instance {} syncing from {} on '{}' ({})",
        config.instance_id,
        config.car_name_api_url,
        config.sync.cron.expression,
        config.sync.cron.timezone.name()
    );

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let db_path = config.catalog_db_path();
    info!("Opening SQLite catalog database at {:?}...", db_path);
    let catalog_store = Arc::new(SqliteCatalogStore::new(&db_path)?);
    server::metrics::set_catalog_entries(catalog_store.count()?);

    let lock = Arc::new(
        SqliteLockProvider::open(&db_path, clock.clone())?.with_min_hold(config.sync.min_hold),
    );
    let cache = Arc::new(ValidationCache::new(
        catalog_store.clone(),
        clock.clone(),
        config.cache.clone(),
    ));
    let fetcher = Arc::new(HttpCarNameFetcher::new(
        &config.car_name_api_url,
        config.fetch_timeout,
    )?);

    let sync_job = Arc::new(CarNameSyncJob::new(
        fetcher,
        catalog_store.clone(),
        lock,
        cache.clone(),
        SyncSettings::new(
            config.instance_id.clone(),
            config.sync.lease,
            config.sync.cron.clone(),
        ),
    ));

    let shutdown_token = CancellationToken::new();
    let (mut scheduler, scheduler_handle) = create_scheduler(clock, shutdown_token.clone());
    scheduler.register_job(sync_job).await;

    let state = ServerState {
        config: ServerConfig {
            requests_logging_level: config.logging_level.clone(),
            port: config.port,
        },
        start_time: Instant::now(),
        catalog_store,
        admission: CarNameAdmission::new(cache),
        scheduler_handle: Some(scheduler_handle),
    };

    tokio::spawn(wait_for_shutdown_signal(shutdown_token.clone()));

    info!("Ready to serve at port {}!", config.port);
    let server_shutdown = shutdown_token.clone();
    let (server_result, _) = tokio::join!(
        async {
            let result = run_server(state, server_shutdown).await;
            // Bring the scheduler down with the server if it fails on its own
            shutdown_token.cancel();
            result
        },
        scheduler.run(),
    );

    info!("Shutdown complete");
    server_result
}
