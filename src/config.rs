use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::store::MAX_RETENTION_DAYS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_ranking_url")]
    pub ranking_url: String,
    #[serde(default = "default_detail_url")]
    pub detail_url: String,
    #[serde(default = "default_day_window")]
    pub day_window: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default)]
    pub fetch_details: bool,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            ranking_url: default_ranking_url(),
            detail_url: default_detail_url(),
            day_window: default_day_window(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            referer: default_referer(),
            fetch_details: false,
            request_delay_ms: default_request_delay_ms(),
            dump_dir: None,
        }
    }
}

fn default_ranking_url() -> String {
    "https://api.bilibili.com/x/web-interface/ranking/region".to_string()
}
fn default_detail_url() -> String {
    "https://api.bilibili.com/x/web-interface/view".to_string()
}
fn default_day_window() -> u32 {
    7
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/126.0.0.0 Safari/537.36".to_string()
}
fn default_referer() -> String {
    "https://www.bilibili.com/".to_string()
}
fn default_request_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_partitions")]
    pub partitions: Vec<i64>,
    #[serde(default = "default_per_partition_limit")]
    pub per_partition_limit: usize,
    #[serde(default)]
    pub force_update: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            partitions: default_partitions(),
            per_partition_limit: default_per_partition_limit(),
            force_update: false,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    3600
}
fn default_partitions() -> Vec<i64> {
    vec![30, 29, 190]
}
fn default_per_partition_limit() -> usize {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,
    #[serde(default = "default_recommend_limit")]
    pub recommend_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            recommend_limit: default_recommend_limit(),
        }
    }
}

fn default_limit() -> i64 {
    20
}
fn default_max_limit() -> i64 {
    100
}
fn default_recommend_limit() -> usize {
    10
}

impl RetrievalConfig {
    /// Resolve a requested limit against the configured default and ceiling.
    pub fn clamp_limit(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }

    /// Recommendation count: `recommend_limit` unless requested, then clamped.
    pub fn resolve_recommend_limit(&self, requested: Option<i64>) -> usize {
        let default = i64::try_from(self.recommend_limit).unwrap_or(self.max_limit);
        let limit = self.clamp_limit(Some(requested.unwrap_or(default)));
        usize::try_from(limit).unwrap_or(1)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    #[serde(default = "default_days_to_keep")]
    pub days_to_keep: i64,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days_to_keep: default_days_to_keep(),
            backup_dir: default_backup_dir(),
        }
    }
}

fn default_days_to_keep() -> i64 {
    30
}
fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Config {
    /// Config rooted at a database path with every other section defaulted.
    ///
    /// Used by tests and embedding binaries that never read a TOML file.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            upstream: UpstreamConfig::default(),
            scheduler: SchedulerConfig::default(),
            retrieval: RetrievalConfig::default(),
            retention: RetentionConfig::default(),
            server: ServerConfig {
                bind: "127.0.0.1:5000".to_string(),
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.upstream.timeout_secs == 0 {
        anyhow::bail!("upstream.timeout_secs must be > 0");
    }

    if config.scheduler.interval_secs == 0 {
        anyhow::bail!("scheduler.interval_secs must be > 0");
    }
    if config.scheduler.enabled && config.scheduler.partitions.is_empty() {
        anyhow::bail!("scheduler.partitions must not be empty when the scheduler is enabled");
    }

    if config.retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }
    if config.retrieval.max_limit < config.retrieval.default_limit {
        anyhow::bail!("retrieval.max_limit must be >= retrieval.default_limit");
    }

    if !(1..=MAX_RETENTION_DAYS).contains(&config.retention.days_to_keep) {
        anyhow::bail!(
            "retention.days_to_keep must be between 1 and {}",
            MAX_RETENTION_DAYS
        );
    }

    Ok(())
}
