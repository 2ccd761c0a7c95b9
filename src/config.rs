//! Configuration module for feedmill.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::feed::{CrawlerEngine, MAX_DESCRIPTION_LENGTH};
use crate::{FeedmillError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Timeout in seconds for acquiring a connection and for busy waits.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/feedmill.db".to_string()
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            connection_timeout_secs: default_connection_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/feedmill.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Synchronization configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Whether the refresh loop runs.
    #[serde(default = "default_sync_enabled")]
    pub enabled: bool,
    /// How often the scheduler looks for due channels, in seconds.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Refresh interval for channels without their own, in minutes.
    #[serde(default = "default_refresh_interval")]
    pub default_refresh_interval_minutes: u32,
    /// Maximum number of channel cycles running at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Upper bound for a single fetch, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Connection timeout for feed requests, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Maximum description length in characters.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    /// Maximum entries taken from one fetch.
    #[serde(default = "default_max_entries")]
    pub max_entries_per_fetch: usize,
    /// Crawler engine used when a channel has no override.
    #[serde(default)]
    pub default_engine: CrawlerEngine,
    /// Warm an in-memory key set per cycle instead of querying per entry.
    #[serde(default = "default_warm_dedup_cache")]
    pub warm_dedup_cache: bool,
    /// Allow feeds on loopback/private hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_sync_enabled() -> bool {
    true
}

fn default_check_interval() -> u64 {
    300 // 5 minutes
}

fn default_refresh_interval() -> u32 {
    60
}

fn default_max_concurrency() -> usize {
    4
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_max_content_length() -> usize {
    MAX_DESCRIPTION_LENGTH
}

fn default_max_entries() -> usize {
    100
}

fn default_warm_dedup_cache() -> bool {
    true
}

impl SyncConfig {
    /// Default refresh interval as a duration.
    pub fn default_refresh_interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.default_refresh_interval_minutes))
    }

    /// Fetch timeout as a duration.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_sync_enabled(),
            check_interval_secs: default_check_interval(),
            default_refresh_interval_minutes: default_refresh_interval(),
            max_concurrency: default_max_concurrency(),
            fetch_timeout_secs: default_fetch_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_redirects: default_max_redirects(),
            max_feed_size_bytes: default_max_feed_size(),
            max_content_length: default_max_content_length(),
            max_entries_per_fetch: default_max_entries(),
            default_engine: CrawlerEngine::default(),
            warm_dedup_cache: default_warm_dedup_cache(),
            allow_private_hosts: false,
        }
    }
}

/// Blacklist configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlacklistConfig {
    /// Title patterns (case-insensitive substring match).
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Delete matching items instead of flagging them.
    #[serde(default)]
    pub delete_on_match: bool,
}

/// Retention configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Whether the sweeper runs.
    #[serde(default = "default_retention_enabled")]
    pub enabled: bool,
    /// Sweep interval in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Checked items older than this are purged.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    /// Checked items beyond the newest N per channel are purged.
    #[serde(default = "default_max_items_per_channel")]
    pub max_items_per_channel: u32,
}

fn default_retention_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    86400 // daily
}

/// Upper bound accepted for `retention.max_age_days` (about a century).
pub const MAX_RETENTION_AGE_DAYS: u32 = 36_500;

fn default_max_age_days() -> u32 {
    30
}

fn default_max_items_per_channel() -> u32 {
    1000
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: default_retention_enabled(),
            sweep_interval_secs: default_sweep_interval(),
            max_age_days: default_max_age_days(),
            max_items_per_channel: default_max_items_per_channel(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Synchronization configuration.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Blacklist rules.
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    /// Retention policy.
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FeedmillError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FeedmillError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FEEDMILL_DATABASE_PATH`: Override the database path
    /// - `FEEDMILL_LOG_LEVEL`: Override the log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FEEDMILL_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(level) = std::env::var("FEEDMILL_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.sync.max_concurrency == 0 {
            return Err(FeedmillError::Config(
                "sync.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.sync.fetch_timeout_secs == 0 {
            return Err(FeedmillError::Config(
                "sync.fetch_timeout_secs must be positive".to_string(),
            ));
        }
        if self.sync.default_refresh_interval_minutes == 0 {
            return Err(FeedmillError::Config(
                "sync.default_refresh_interval_minutes must be positive".to_string(),
            ));
        }
        if self.sync.check_interval_secs == 0 || self.retention.sweep_interval_secs == 0 {
            return Err(FeedmillError::Config(
                "loop intervals must be positive".to_string(),
            ));
        }
        if self.retention.max_age_days > MAX_RETENTION_AGE_DAYS {
            return Err(FeedmillError::Config(format!(
                "retention.max_age_days must be at most {MAX_RETENTION_AGE_DAYS}"
            )));
        }
        if self.database.max_connections == 0 {
            return Err(FeedmillError::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
