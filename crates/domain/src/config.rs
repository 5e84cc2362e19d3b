//! Configuration management

use std::time::Duration;

use fieldsync_common::sync::retry::RetryConfig;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_AUTO_SYNC_INTERVAL_MS, DEFAULT_BATCH_SIZE, DEFAULT_DATABASE_PATH,
    DEFAULT_INLINE_RETRIES, DEFAULT_LOG_LEVEL, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_QUEUE_SIZE,
    DEFAULT_POOL_SIZE, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RETENTION_DAYS, MATCH_SCOUTING_PATH,
    PIT_SCOUTING_PATH, SUPER_SCOUTING_PATH,
};
use crate::errors::{FieldSyncError, Result};
use crate::types::SubmissionType;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub queue: QueueConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the scouting API; required
    pub api_base_url: String,
    pub auto_sync_interval_ms: u64,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub enable_background_sync: bool,
    pub request_timeout_ms: u64,
    /// Extra attempts inside one run before falling back to durable backoff
    pub inline_retries: u32,
    /// Optional URL probed to decide whether the device is online
    pub connectivity_url: Option<String>,
    pub endpoints: EndpointConfig,
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            auto_sync_interval_ms: DEFAULT_AUTO_SYNC_INTERVAL_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            enable_background_sync: true,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            inline_retries: DEFAULT_INLINE_RETRIES,
            connectivity_url: None,
            endpoints: EndpointConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_millis(self.auto_sync_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Remote path (relative to `api_base_url`) per submission type.
/// An empty path leaves the type unmapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub match_scouting: String,
    pub pit_scouting: String,
    pub super_scouting: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            match_scouting: MATCH_SCOUTING_PATH.to_string(),
            pit_scouting: PIT_SCOUTING_PATH.to_string(),
            super_scouting: SUPER_SCOUTING_PATH.to_string(),
        }
    }
}

impl EndpointConfig {
    pub fn path_for(&self, submission_type: SubmissionType) -> Option<&str> {
        let path = match submission_type {
            SubmissionType::MatchScouting => &self.match_scouting,
            SubmissionType::PitScouting => &self.pit_scouting,
            SubmissionType::SuperScouting => &self.super_scouting,
        };
        let path = path.trim_matches('/');
        (!path.is_empty()).then_some(path)
    }
}

/// Local queue limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of unsynced submissions held locally
    pub max_queue_size: usize,
    /// Age after which submissions are eligible for cleanup
    pub retention_days: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_queue_size: DEFAULT_MAX_QUEUE_SIZE, retention_days: DEFAULT_RETENTION_DAYS }
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: DEFAULT_DATABASE_PATH.to_string(), pool_size: DEFAULT_POOL_SIZE }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: DEFAULT_LOG_LEVEL.to_string(), json: false }
    }
}

impl Config {
    /// Defaults with the given API base URL.
    pub fn with_api_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            sync: SyncConfig { api_base_url: api_base_url.into(), ..SyncConfig::default() },
            ..Self::default()
        }
    }

    /// Reject configurations the engine cannot run with.
    ///
    /// # Errors
    /// Returns `FieldSyncError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let url = self.sync.api_base_url.trim();
        if url.is_empty() {
            return Err(invalid("sync.api_base_url is required"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid(format!("sync.api_base_url must be http(s), got {url}")));
        }
        if self.sync.batch_size == 0 {
            return Err(invalid("sync.batch_size must be greater than zero"));
        }
        if self.sync.max_concurrency == 0 {
            return Err(invalid("sync.max_concurrency must be greater than zero"));
        }
        if self.sync.auto_sync_interval_ms == 0 {
            return Err(invalid("sync.auto_sync_interval_ms must be greater than zero"));
        }
        if self.sync.request_timeout_ms == 0 {
            return Err(invalid("sync.request_timeout_ms must be greater than zero"));
        }
        self.sync.retry.validate().map_err(|e| invalid(format!("sync.retry: {e}")))?;
        if self.queue.max_queue_size == 0 {
            return Err(invalid("queue.max_queue_size must be greater than zero"));
        }
        if self.database.path.trim().is_empty() {
            return Err(invalid("database.path is required"));
        }
        if self.database.pool_size == 0 {
            return Err(invalid("database.pool_size must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> FieldSyncError {
    FieldSyncError::Config(message.into())
}
