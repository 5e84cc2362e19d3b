//! Error conversions from third-party infrastructure crates

pub mod conversions;

pub use conversions::{IntoDatabaseError, IntoSyncError};
