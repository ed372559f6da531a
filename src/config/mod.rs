//! Configuration loading for the lotsync service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `LOTSYNC_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Application configuration derived from `LOTSYNC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retry: RetryPolicyConfig,
}

/// Upstream inventory feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FeedConfig {
    /// Base URL of the external inventory API
    ///
    /// Environment variable: `LOTSYNC_FEED_BASE_URL`
    #[serde(default = "default_feed_base_url")]
    pub base_url: String,

    /// API key credential sent on every feed request
    ///
    /// Environment variable: `LOTSYNC_FEED_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Records requested per page (default: 100)
    ///
    /// Environment variable: `LOTSYNC_FEED_PAGE_SIZE`
    #[serde(default = "default_feed_page_size")]
    #[schema(example = 100)]
    pub page_size: u32,

    /// Per-request timeout in seconds (default: 60)
    ///
    /// Environment variable: `LOTSYNC_FEED_REQUEST_TIMEOUT_SECS`
    #[serde(default = "default_feed_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Minimum interval between feed requests in milliseconds (default: 200)
    ///
    /// Enforced across all concurrent callers sharing one client.
    ///
    /// Environment variable: `LOTSYNC_FEED_MIN_REQUEST_INTERVAL_MS`
    #[serde(default = "default_feed_min_request_interval_ms")]
    pub min_request_interval_ms: u64,

    /// Retry ceiling for throttled (429) page fetches (default: 5)
    ///
    /// Environment variable: `LOTSYNC_FEED_MAX_RETRIES`
    #[serde(default = "default_feed_max_retries")]
    pub max_retries: u32,

    /// Base delay for 429 backoff in milliseconds (default: 1000)
    ///
    /// Retry N sleeps `backoff_base_ms * backoff_multiplier^N`.
    ///
    /// Environment variable: `LOTSYNC_FEED_BACKOFF_BASE_MS`
    #[serde(default = "default_feed_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff multiplier for 429 retries (default: 2.0)
    ///
    /// Environment variable: `LOTSYNC_FEED_BACKOFF_MULTIPLIER`
    #[serde(default = "default_feed_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

/// Sweep execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncConfig {
    /// Pages fetched concurrently within a sweep (default: 5)
    ///
    /// Environment variable: `LOTSYNC_SYNC_PAGE_CONCURRENCY`
    #[serde(default = "default_sync_page_concurrency")]
    #[schema(example = 5)]
    pub page_concurrency: usize,

    /// Records per upsert batch (default: 100, bounds: 50-250)
    ///
    /// Environment variable: `LOTSYNC_SYNC_BATCH_SIZE`
    #[serde(default = "default_sync_batch_size")]
    pub batch_size: usize,

    /// Wall-clock budget for one invocation in seconds (default: 480)
    ///
    /// Exceeding the budget checkpoints progress and stops; the caller
    /// re-invokes with `resume=true` to continue.
    ///
    /// Environment variable: `LOTSYNC_SYNC_MAX_EXECUTION_SECS`
    #[serde(default = "default_sync_max_execution_secs")]
    pub max_execution_secs: u64,

    /// Accumulated page failures that abort the sweep (default: 20)
    ///
    /// Environment variable: `LOTSYNC_SYNC_PAGE_ERROR_CAP`
    #[serde(default = "default_sync_page_error_cap")]
    pub page_error_cap: usize,

    /// Minimum per-batch validation pass ratio before warning (default: 0.95)
    ///
    /// Environment variable: `LOTSYNC_SYNC_BATCH_VALIDITY_THRESHOLD`
    #[serde(default = "default_sync_batch_validity_threshold")]
    #[schema(example = 0.95, minimum = 0.0, maximum = 1.0)]
    pub batch_validity_threshold: f64,

    /// Error rate above which a finished sweep is completed_with_errors
    /// (default: 0.10)
    ///
    /// Environment variable: `LOTSYNC_SYNC_ERROR_RATE_THRESHOLD`
    #[serde(default = "default_sync_error_rate_threshold")]
    pub error_rate_threshold: f64,

    /// Hours a sold listing stays visible before removal (default: 24)
    ///
    /// Environment variable: `LOTSYNC_SYNC_GRACE_PERIOD_HOURS`
    #[serde(default = "default_sync_grace_period_hours")]
    pub grace_period_hours: i64,

    /// Seconds without activity before a running job is failed (default: 3600)
    ///
    /// Environment variable: `LOTSYNC_SYNC_STALE_JOB_SECS`
    #[serde(default = "default_sync_stale_job_secs")]
    pub stale_job_secs: i64,

    /// Interval of the background stale-job watchdog in seconds (default: 300)
    ///
    /// Environment variable: `LOTSYNC_SYNC_WATCHDOG_TICK_SECS`
    #[serde(default = "default_sync_watchdog_tick_secs")]
    pub watchdog_tick_secs: u64,

    /// Optional page cap per invocation; stopping on it reports BatchComplete
    ///
    /// Environment variable: `LOTSYNC_SYNC_MAX_PAGES_PER_INVOCATION`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages_per_invocation: Option<u32>,
}

/// Caller-side retry coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RetryPolicyConfig {
    /// Maximum sweep invocation attempts (default: 3)
    ///
    /// Environment variable: `LOTSYNC_RETRY_MAX_ATTEMPTS`
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,

    /// Whether to run the advisory connectivity preflight (default: true)
    ///
    /// Environment variable: `LOTSYNC_RETRY_PREFLIGHT`
    #[serde(default = "default_retry_preflight")]
    pub preflight: bool,
}

impl AppConfig {
    /// Resolve the configured bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Serialize the configuration with credentials redacted, for startup logs.
    pub fn redacted_json(&self) -> Result<String, serde_json::Error> {
        let mut clone = self.clone();
        if clone.feed.api_key.is_some() {
            clone.feed.api_key = Some("<redacted>".to_string());
        }
        serde_json::to_string(&clone)
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.feed.validate()?;
        self.sync.validate()?;
        self.retry.validate()
    }
}

impl FeedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > 1000 {
            return Err(ConfigError::InvalidFeedPageSize {
                value: self.page_size,
            });
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidFeedBackoffMultiplier {
                value: self.backoff_multiplier,
            });
        }
        Ok(())
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_concurrency == 0 || self.page_concurrency > 20 {
            return Err(ConfigError::InvalidPageConcurrency {
                value: self.page_concurrency,
            });
        }
        if !(50..=250).contains(&self.batch_size) {
            return Err(ConfigError::InvalidBatchSize {
                value: self.batch_size,
            });
        }
        if !(0.0..=1.0).contains(&self.batch_validity_threshold) {
            return Err(ConfigError::InvalidValidityThreshold {
                value: self.batch_validity_threshold,
            });
        }
        if !(0.0..=1.0).contains(&self.error_rate_threshold) {
            return Err(ConfigError::InvalidErrorRateThreshold {
                value: self.error_rate_threshold,
            });
        }
        if self.grace_period_hours <= 0 {
            return Err(ConfigError::InvalidGracePeriod {
                value: self.grace_period_hours,
            });
        }
        if self.stale_job_secs < 60 {
            return Err(ConfigError::InvalidStaleJobSecs {
                value: self.stale_job_secs,
            });
        }
        Ok(())
    }
}

impl RetryPolicyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err(ConfigError::InvalidRetryMaxAttempts {
                value: self.max_attempts,
            });
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            feed: FeedConfig::default(),
            sync: SyncConfig::default(),
            retry: RetryPolicyConfig::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_base_url(),
            api_key: None,
            page_size: default_feed_page_size(),
            request_timeout_secs: default_feed_request_timeout_secs(),
            min_request_interval_ms: default_feed_min_request_interval_ms(),
            max_retries: default_feed_max_retries(),
            backoff_base_ms: default_feed_backoff_base_ms(),
            backoff_multiplier: default_feed_backoff_multiplier(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_concurrency: default_sync_page_concurrency(),
            batch_size: default_sync_batch_size(),
            max_execution_secs: default_sync_max_execution_secs(),
            page_error_cap: default_sync_page_error_cap(),
            batch_validity_threshold: default_sync_batch_validity_threshold(),
            error_rate_threshold: default_sync_error_rate_threshold(),
            grace_period_hours: default_sync_grace_period_hours(),
            stale_job_secs: default_sync_stale_job_secs(),
            watchdog_tick_secs: default_sync_watchdog_tick_secs(),
            max_pages_per_invocation: None,
        }
    }
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            preflight: default_retry_preflight(),
        }
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost:5432/lotsync".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_feed_base_url() -> String {
    "https://inventory-feed.example.com/api/v2".to_string()
}

fn default_feed_page_size() -> u32 {
    100
}

fn default_feed_request_timeout_secs() -> u64 {
    60
}

fn default_feed_min_request_interval_ms() -> u64 {
    200
}

fn default_feed_max_retries() -> u32 {
    5
}

fn default_feed_backoff_base_ms() -> u64 {
    1000
}

fn default_feed_backoff_multiplier() -> f64 {
    2.0
}

fn default_sync_page_concurrency() -> usize {
    5
}

fn default_sync_batch_size() -> usize {
    100
}

fn default_sync_max_execution_secs() -> u64 {
    480
}

fn default_sync_page_error_cap() -> usize {
    20
}

fn default_sync_batch_validity_threshold() -> f64 {
    0.95
}

fn default_sync_error_rate_threshold() -> f64 {
    0.10
}

fn default_sync_grace_period_hours() -> i64 {
    24
}

fn default_sync_stale_job_secs() -> i64 {
    3600
}

fn default_sync_watchdog_tick_secs() -> u64 {
    300
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_preflight() -> bool {
    true
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("feed API key is missing; set LOTSYNC_FEED_API_KEY environment variable")]
    MissingFeedApiKey,
    #[error("feed page size must be between 1 and 1000, got {value}")]
    InvalidFeedPageSize { value: u32 },
    #[error("feed backoff multiplier must be at least 1.0, got {value}")]
    InvalidFeedBackoffMultiplier { value: f64 },
    #[error("sync page concurrency must be between 1 and 20, got {value}")]
    InvalidPageConcurrency { value: usize },
    #[error("sync batch size must be between 50 and 250, got {value}")]
    InvalidBatchSize { value: usize },
    #[error("batch validity threshold must be between 0.0 and 1.0, got {value}")]
    InvalidValidityThreshold { value: f64 },
    #[error("error rate threshold must be between 0.0 and 1.0, got {value}")]
    InvalidErrorRateThreshold { value: f64 },
    #[error("grace period must be positive, got {value} hours")]
    InvalidGracePeriod { value: i64 },
    #[error("stale job threshold must be at least 60 seconds, got {value}")]
    InvalidStaleJobSecs { value: i64 },
    #[error("retry max attempts must be between 1 and 10, got {value}")]
    InvalidRetryMaxAttempts { value: u32 },
}

/// Loads configuration using layered `.env` files and `LOTSYNC_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration from `.env` layers overlaid with the process
    /// environment. The process environment always wins.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut layered = self.collect_layered_env()?;

        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("LOTSYNC_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let take = |layered: &mut BTreeMap<String, String>, key: &str| {
            layered.remove(key).filter(|v| !v.trim().is_empty())
        };

        let profile = take(&mut layered, "PROFILE").unwrap_or_else(default_profile);
        let api_bind_addr =
            take(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        let database_url = take(&mut layered, "DATABASE_URL").unwrap_or_else(default_database_url);
        let db_max_connections = take(&mut layered, "DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = take(&mut layered, "DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let feed = FeedConfig {
            base_url: take(&mut layered, "FEED_BASE_URL").unwrap_or_else(default_feed_base_url),
            api_key: take(&mut layered, "FEED_API_KEY"),
            page_size: take(&mut layered, "FEED_PAGE_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_feed_page_size),
            request_timeout_secs: take(&mut layered, "FEED_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_feed_request_timeout_secs),
            min_request_interval_ms: take(&mut layered, "FEED_MIN_REQUEST_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_feed_min_request_interval_ms),
            max_retries: take(&mut layered, "FEED_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_feed_max_retries),
            backoff_base_ms: take(&mut layered, "FEED_BACKOFF_BASE_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_feed_backoff_base_ms),
            backoff_multiplier: take(&mut layered, "FEED_BACKOFF_MULTIPLIER")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_feed_backoff_multiplier),
        };

        let sync = SyncConfig {
            page_concurrency: take(&mut layered, "SYNC_PAGE_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_sync_page_concurrency),
            batch_size: take(&mut layered, "SYNC_BATCH_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_sync_batch_size),
            max_execution_secs: take(&mut layered, "SYNC_MAX_EXECUTION_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_sync_max_execution_secs),
            page_error_cap: take(&mut layered, "SYNC_PAGE_ERROR_CAP")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_sync_page_error_cap),
            batch_validity_threshold: take(&mut layered, "SYNC_BATCH_VALIDITY_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_sync_batch_validity_threshold),
            error_rate_threshold: take(&mut layered, "SYNC_ERROR_RATE_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_sync_error_rate_threshold),
            grace_period_hours: take(&mut layered, "SYNC_GRACE_PERIOD_HOURS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_sync_grace_period_hours),
            stale_job_secs: take(&mut layered, "SYNC_STALE_JOB_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_sync_stale_job_secs),
            watchdog_tick_secs: take(&mut layered, "SYNC_WATCHDOG_TICK_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_sync_watchdog_tick_secs),
            max_pages_per_invocation: take(&mut layered, "SYNC_MAX_PAGES_PER_INVOCATION")
                .and_then(|v| v.parse().ok()),
        };

        let retry = RetryPolicyConfig {
            max_attempts: take(&mut layered, "RETRY_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_max_attempts),
            preflight: take(&mut layered, "RETRY_PREFLIGHT")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_preflight),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            feed,
            sync,
            retry,
        };

        config.bind_addr().map_err(|source| ConfigError::InvalidBindAddr {
            value: config.api_bind_addr.clone(),
            source,
        })?;
        config.validate()?;

        Ok(config)
    }

    /// Reads `.env` then `.env.local` from the base directory, later layers
    /// overriding earlier ones. Missing files are skipped silently.
    fn collect_layered_env(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut layered = BTreeMap::new();

        for name in [".env", ".env.local"] {
            let path = self.base_dir.join(name);
            match dotenvy::from_path_iter(&path) {
                Ok(iter) => {
                    for item in iter {
                        let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                            path: path.clone(),
                            source,
                        })?;
                        if let Some(stripped) = key.strip_prefix("LOTSYNC_") {
                            layered.insert(stripped.to_string(), value);
                        }
                    }
                }
                Err(dotenvy::Error::Io(ref io_err))
                    if io_err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }

        Ok(layered)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
