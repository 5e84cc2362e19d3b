// Retry module: exponential backoff with jitter and outcome classification

pub mod classify;
pub mod config;
pub mod constants;
pub mod error;
pub mod strategy;

pub use classify::{classify_status, is_retryable_status, is_terminal_message, HttpOutcome};
pub use config::RetryConfig;
pub use error::{RetryError, RetryResult};
#[cfg(feature = "runtime")]
pub use strategy::RetryAttempt;
pub use strategy::RetryStrategy;
