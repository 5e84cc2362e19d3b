//! # FieldSync Domain
//!
//! Business domain types for the offline-first submission queue.
//!
//! This crate contains:
//! - The [`Submission`] entity and its sync state machine
//! - Sync reports, queue statistics and domain events
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - Depends only on `fieldsync-common` (foundation tier) for the retry
//!   policy and error classification
//! - Pure data and state transitions; no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
