// Constants for retry module

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default base delay for exponential backoff, in milliseconds
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Default maximum delay cap, in milliseconds
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Default growth factor between consecutive delays
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default upper bound of the uniform jitter added to each delay, in milliseconds
pub const DEFAULT_JITTER_MS: u64 = 500;

/// Maximum exponent for exponential backoff calculation to prevent overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Maximum allowed `max_retries` value
pub const MAX_MAX_RETRIES: u32 = 100;

/// Phrases in an error message that mark a failure as permanent
pub const TERMINAL_PHRASES: [&str; 4] = ["unauthorized", "forbidden", "not found", "bad request"];
