use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveTime;
use tracing::trace;

use crate::{DestinationId, EntityId};

/// History storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory ring buffer (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days (events older than this are deleted)
        retention_days: Option<u32>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: None,
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./history.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    /// History storage (defaults to SQLite)
    pub history: Option<StorageConfig>,

    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,

    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,

    #[serde(default)]
    pub transports: Vec<TransportConfig>,

    /// Local time of the daily host name refresh
    #[serde(default = "default_host_refresh_at")]
    pub host_refresh_at: NaiveTime,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_live_base")]
    pub live_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    pub cookie: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            live_base: default_live_base(),
            api_base: default_api_base(),
            timeout_secs: default_timeout(),
            cookie: None,
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct NetworkConfig {
    /// Route all upstream requests through this proxy
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PollingConfig {
    #[serde(default)]
    pub pool_mode: bool,
    #[serde(default = "default_pool_batch_size")]
    pub pool_batch_size: usize,
    #[serde(default = "default_proxied_period")]
    pub proxied_period_secs: u64,
    #[serde(default = "default_pool_period")]
    pub pool_period_secs: u64,
    #[serde(default = "default_day_period")]
    pub day_period_secs: u64,
    #[serde(default = "default_night_period")]
    pub night_period_secs: u64,
    #[serde(default = "default_day_start_hour")]
    pub day_start_hour: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            pool_mode: false,
            pool_batch_size: default_pool_batch_size(),
            proxied_period_secs: default_proxied_period(),
            pool_period_secs: default_pool_period(),
            day_period_secs: default_day_period(),
            night_period_secs: default_night_period(),
            day_start_hour: default_day_start_hour(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SubscriptionConfig {
    pub entity: EntityId,
    #[serde(default)]
    pub destinations: Vec<DestinationId>,
    pub host_name: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DestinationConfig {
    pub id: DestinationId,
    #[serde(default)]
    pub notice: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Chat bot exposing a OneBot compatible HTTP API
    Onebot(OneBot),
    Discord(Discord),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OneBot {
    pub name: String,
    pub url: String,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub name: String,
    /// Webhook URL per destination
    #[serde(default)]
    pub webhooks: HashMap<DestinationId, String>,
}

fn default_live_base() -> String {
    String::from("https://api.live.bilibili.com")
}

fn default_api_base() -> String {
    String::from("https://api.bilibili.com")
}

fn default_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    String::from("Mozilla/5.0 (X11; Linux x86_64) livewatch")
}

fn default_pool_batch_size() -> usize {
    2
}

fn default_proxied_period() -> u64 {
    20
}

fn default_pool_period() -> u64 {
    11
}

fn default_day_period() -> u64 {
    60
}

fn default_night_period() -> u64 {
    300
}

fn default_day_start_hour() -> u32 {
    9
}

fn default_host_refresh_at() -> NaiveTime {
    NaiveTime::from_hms_opt(2, 2, 33).unwrap_or_default()
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
