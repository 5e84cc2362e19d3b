//! # FieldSync Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - SQLite submission and metadata stores (r2d2 pool, versioned migrations)
//! - HTTP uploader and connectivity probe (reqwest)
//! - Configuration loading and tracing initialisation
//!
//! ## Architecture
//! - Implements traits defined in `fieldsync-core`
//! - Contains all "impure" code (disk, network, process environment)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod observability;
pub mod sync;

// Re-export commonly used items
pub use database::{
    DbManager, Migration, MigrationRunner, SqliteMetadataStore, SqliteSubmissionRepository,
};
pub use errors::{IntoDatabaseError, IntoSyncError};
pub use http::{HttpClient, HttpClientBuilder};
pub use observability::init_tracing;
pub use sync::{HttpConnectivityProbe, HttpSubmissionUploader};
