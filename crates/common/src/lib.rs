//! Foundation utilities shared across FieldSync crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification, collections, clocks, retry policy
//! - `observability`: `tracing` instrumentation for the runtime helpers
//! - `runtime`: async retry execution on top of tokio
//! - `test-utils`: everything above, for downstream test suites

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod collections;
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod sync;
#[cfg(feature = "foundation")]
pub mod time;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use collections::RingBuffer;
#[cfg(feature = "foundation")]
pub use error::{ErrorClassification, ErrorSeverity};
#[cfg(feature = "foundation")]
pub use sync::retry::{
    classify_status, is_retryable_status, is_terminal_message, HttpOutcome, RetryConfig,
    RetryError, RetryResult, RetryStrategy,
};
#[cfg(feature = "runtime")]
pub use sync::retry::RetryAttempt;
#[cfg(feature = "foundation")]
pub use time::{Clock, MockClock, SharedClock, SystemClock};
