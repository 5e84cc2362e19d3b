//! Façade services used by the application layer.
//!
//! - [`SubmissionService`]: queueing and queue hygiene
//! - [`SyncService`]: manual sync, auto-sync control and status

pub mod submission_service;
pub mod sync_service;

pub use submission_service::SubmissionService;
pub use sync_service::{SyncService, SyncStatusSnapshot};
