//! # FieldSync Core
//!
//! Sync engine logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for storage, upload and connectivity
//! - The in-process [`EventBus`]
//! - The [`SyncCoordinator`] that drains the queue
//! - Thin façade services used by the application layer
//!
//! ## Architecture Principles
//! - Depends only on `fieldsync-common` and `fieldsync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod events;
pub mod services;
pub mod sync;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export specific items to avoid ambiguity
pub use events::{EventBus, HandlerResult, SubscriptionHandle};
pub use services::{SubmissionService, SyncService, SyncStatusSnapshot};
pub use sync::coordinator::{CoordinatorConfig, SyncCoordinator};
pub use sync::ports::{
    AssumeOnline, ConnectivityProbe, MetadataStore, SubmissionRepository, SubmissionUploader,
};
