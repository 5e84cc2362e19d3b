//! Port interfaces for sync operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldsync_domain::{
    DatabaseError, QueueStats, StatusKind, Submission, SubmissionFilter, SyncError,
};

/// Durable store for queued submissions
///
/// Each operation is atomic on its own; no lock is held across calls.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Insert a new submission
    async fn save(&self, submission: &Submission) -> Result<(), DatabaseError>;

    /// Fetch a submission by id
    async fn find_by_id(&self, id: &str) -> Result<Option<Submission>, DatabaseError>;

    /// All `Pending` submissions, in no particular order
    async fn find_pending(&self) -> Result<Vec<Submission>, DatabaseError>;

    /// Submissions matching `filter`, highest priority first, then oldest first
    async fn find_all(&self, filter: &SubmissionFilter) -> Result<Vec<Submission>, DatabaseError>;

    /// Replace a stored submission; fails if it does not exist
    async fn update(&self, submission: &Submission) -> Result<(), DatabaseError>;

    /// Remove a submission, returning whether it existed
    async fn delete(&self, id: &str) -> Result<bool, DatabaseError>;

    /// Number of submissions matching `filter` (`limit` is ignored)
    async fn count(&self, filter: &SubmissionFilter) -> Result<usize, DatabaseError>;

    /// Remove every submission created strictly before `cutoff`
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError>;

    /// Remove everything
    async fn clear(&self) -> Result<usize, DatabaseError>;

    /// Per-status counts. The default issues one `count` per bucket; stores
    /// that can aggregate in one query should override it.
    async fn stats(&self) -> Result<QueueStats, DatabaseError> {
        Ok(QueueStats {
            pending: self.count(&SubmissionFilter::with_status(StatusKind::Pending)).await?,
            syncing: self.count(&SubmissionFilter::with_status(StatusKind::Syncing)).await?,
            failed: self.count(&SubmissionFilter::retryable_failures()).await?,
            terminal: self.count(&SubmissionFilter::terminal_failures()).await?,
            succeeded: self.count(&SubmissionFilter::with_status(StatusKind::Success)).await?,
            total: self.count(&SubmissionFilter::new()).await?,
        })
    }
}

/// Sends one submission to the remote service
#[async_trait]
pub trait SubmissionUploader: Send + Sync {
    /// Upload `submission`; the error's `recoverable` flag decides retries
    async fn upload(&self, submission: &Submission) -> Result<(), SyncError>;
}

/// Opportunistic online/offline signal
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Probe used when the platform offers no connectivity signal
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeOnline;

#[async_trait]
impl ConnectivityProbe for AssumeOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Small key/value store for engine bookkeeping (last sync time)
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, DatabaseError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError>;
}
