mod file_config;

pub use file_config::{CacheConfig, FileConfig, SyncConfig};

use crate::background_jobs::CronSpec;
use crate::cache::CacheSettings;
use crate::server::RequestsLoggingLevel;
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_SYNC_CRON: &str = "0 0 0 * * *";
pub const DEFAULT_SYNC_TIMEZONE: &str = "Europe/Zagreb";
pub const DEFAULT_LEASE_SEC: u64 = 10 * 60;
pub const DEFAULT_FETCH_TIMEOUT_SEC: u64 = 30;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub car_name_api_url: Option<String>,
    pub fetch_timeout_sec: u64,
    pub instance_id: Option<String>,
    pub logging_level: RequestsLoggingLevel,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            port: 3001,
            car_name_api_url: None,
            fetch_timeout_sec: DEFAULT_FETCH_TIMEOUT_SEC,
            instance_id: None,
            logging_level: RequestsLoggingLevel::Path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub car_name_api_url: String,
    pub fetch_timeout: Duration,
    pub instance_id: String,
    pub logging_level: RequestsLoggingLevel,

    // Feature configs (with defaults)
    pub sync: SyncJobSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct SyncJobSettings {
    pub cron: CronSpec,
    pub lease: Duration,
    pub min_hold: Duration,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| anyhow!("db_dir must be specified via --db-dir or in config file"))?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let car_name_api_url = file
            .car_name_api_url
            .or_else(|| cli.car_name_api_url.clone())
            .ok_or_else(|| {
                anyhow!(
                    "car_name_api_url must be specified via --car-name-api-url or in config file"
                )
            })?;
        if !car_name_api_url.starts_with("http://") && !car_name_api_url.starts_with("https://") {
            bail!("car_name_api_url must be an http(s) URL: {}", car_name_api_url);
        }

        let fetch_timeout =
            Duration::from_secs(file.fetch_timeout_sec.unwrap_or(cli.fetch_timeout_sec));
        if fetch_timeout.is_zero() {
            bail!("fetch_timeout_sec must be greater than zero");
        }

        let instance_id = file
            .instance_id
            .or_else(|| cli.instance_id.clone())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("instance-{}", Uuid::new_v4()));

        // Sync settings - merge file config with defaults
        let sync_file = file.sync.unwrap_or_default();
        let cron = CronSpec::parse(
            sync_file.cron.as_deref().unwrap_or(DEFAULT_SYNC_CRON),
            sync_file.timezone.as_deref().unwrap_or(DEFAULT_SYNC_TIMEZONE),
        )
        .map_err(|e| anyhow!(e))?;
        let lease = Duration::from_secs(sync_file.lease_sec.unwrap_or(DEFAULT_LEASE_SEC));
        let min_hold = Duration::from_secs(sync_file.min_hold_sec.unwrap_or(0));

        // A hung fetch must not be able to outlive the lock
        if fetch_timeout >= lease {
            bail!(
                "fetch_timeout_sec ({}) must be shorter than the sync lease ({}s)",
                fetch_timeout.as_secs(),
                lease.as_secs()
            );
        }
        if min_hold > lease {
            bail!(
                "sync min_hold_sec ({}) must not exceed the sync lease ({}s)",
                min_hold.as_secs(),
                lease.as_secs()
            );
        }

        let cache_file = file.cache.unwrap_or_default();
        let cache = CacheSettings {
            max_entries: cache_file.max_entries,
            ttl: match cache_file.ttl_sec {
                Some(0) => bail!("cache ttl_sec must be greater than zero"),
                ttl_sec => ttl_sec.map(Duration::from_secs),
            },
        };

        Ok(Self {
            db_dir,
            port,
            car_name_api_url,
            fetch_timeout,
            instance_id,
            logging_level,
            sync: SyncJobSettings {
                cron,
                lease,
                min_hold,
            },
            cache,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
