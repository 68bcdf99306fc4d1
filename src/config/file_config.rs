use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub car_name_api_url: Option<String>,
    pub fetch_timeout_sec: Option<u64>,
    pub instance_id: Option<String>,
    pub logging_level: Option<String>,

    // Feature configs
    pub sync: Option<SyncConfig>,
    pub cache: Option<CacheConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SyncConfig {
    /// Six-field cron expression, e.g. "0 0 0 * * *"
    pub cron: Option<String>,
    /// IANA timezone name the cron expression is evaluated in
    pub timezone: Option<String>,
    pub lease_sec: Option<u64>,
    pub min_hold_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: Option<usize>,
    pub ttl_sec: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
