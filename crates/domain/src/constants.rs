//! Domain constants
//!
//! Defaults shared by the configuration structs and the services.

// Sync engine
pub const DEFAULT_AUTO_SYNC_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_INLINE_RETRIES: u32 = 0;

// Queue
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1_000;
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

// Storage
pub const DEFAULT_DATABASE_PATH: &str = "fieldsync.db";
pub const DEFAULT_POOL_SIZE: u32 = 4;

// Logging
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Event bus
pub const EVENT_HISTORY_CAPACITY: usize = 100;

// Metadata keys
pub const METADATA_LAST_SYNC_AT: &str = "last_sync_at";

// Remote endpoint paths per submission type
pub const MATCH_SCOUTING_PATH: &str = "match-scouting";
pub const PIT_SCOUTING_PATH: &str = "pit-scouting";
pub const SUPER_SCOUTING_PATH: &str = "super-scouting";
