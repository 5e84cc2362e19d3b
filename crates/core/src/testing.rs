//! In-memory port implementations for tests.
//!
//! Enabled for this crate's unit tests and, through the `test-utils`
//! feature, for downstream crates.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldsync_domain::{DatabaseError, StatusKind, Submission, SubmissionFilter, SyncError};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::sync::ports::{MetadataStore, SubmissionRepository, SubmissionUploader};

/// Repository backed by a `HashMap`, with optional injected update failures.
#[derive(Default)]
pub struct InMemorySubmissionRepository {
    rows: Mutex<HashMap<String, Submission>>,
    update_failure: Mutex<Option<DatabaseError>>,
    scheduled_update_failure: Mutex<Option<(usize, DatabaseError)>>,
    update_calls: AtomicUsize,
}

impl InMemorySubmissionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `update` fail with `error`.
    pub fn fail_updates_with(&self, error: DatabaseError) {
        *self.update_failure.lock() = Some(error);
    }

    /// Fail only the `nth` `update` from now on (1-based); the others succeed.
    pub fn fail_nth_update(&self, nth: usize, error: DatabaseError) {
        let due = self.update_calls.load(Ordering::SeqCst) + nth;
        *self.scheduled_update_failure.lock() = Some((due, error));
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    fn sorted(&self, filter: &SubmissionFilter) -> Vec<Submission> {
        let mut matches: Vec<Submission> =
            self.rows.lock().values().filter(|s| filter.matches(s)).cloned().collect();
        matches.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at))
        });
        matches
    }
}

#[async_trait]
impl SubmissionRepository for InMemorySubmissionRepository {
    async fn save(&self, submission: &Submission) -> Result<(), DatabaseError> {
        let mut rows = self.rows.lock();
        if rows.contains_key(&submission.id) {
            return Err(DatabaseError::operation_failed(format!(
                "submission {} already exists",
                submission.id
            )));
        }
        rows.insert(submission.id.clone(), submission.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Submission>, DatabaseError> {
        Ok(self.rows.lock().get(id).cloned())
    }

    async fn find_pending(&self) -> Result<Vec<Submission>, DatabaseError> {
        Ok(self.sorted(&SubmissionFilter::with_status(StatusKind::Pending)))
    }

    async fn find_all(&self, filter: &SubmissionFilter) -> Result<Vec<Submission>, DatabaseError> {
        let mut rows = self.sorted(filter);
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn update(&self, submission: &Submission) -> Result<(), DatabaseError> {
        let call = self.update_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(err) = self.update_failure.lock().clone() {
            return Err(err);
        }
        {
            let mut scheduled = self.scheduled_update_failure.lock();
            if scheduled.as_ref().is_some_and(|(due, _)| *due == call) {
                if let Some((_, err)) = scheduled.take() {
                    return Err(err);
                }
            }
        }
        let mut rows = self.rows.lock();
        match rows.get_mut(&submission.id) {
            Some(row) => {
                *row = submission.clone();
                Ok(())
            }
            None => Err(DatabaseError::operation_failed(format!(
                "submission {} does not exist",
                submission.id
            ))),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
        Ok(self.rows.lock().remove(id).is_some())
    }

    async fn count(&self, filter: &SubmissionFilter) -> Result<usize, DatabaseError> {
        Ok(self.rows.lock().values().filter(|s| filter.matches(s)).count())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|_, s| s.created_at >= cutoff);
        Ok(before - rows.len())
    }

    async fn clear(&self) -> Result<usize, DatabaseError> {
        let mut rows = self.rows.lock();
        let removed = rows.len();
        rows.clear();
        Ok(removed)
    }
}

struct GateState {
    entered: Notify,
    release: Notify,
}

/// Holds the next upload open until released.
pub struct UploadGate {
    state: Arc<GateState>,
}

impl UploadGate {
    /// Resolves once the held upload has started.
    pub async fn wait_until_entered(&self) {
        self.state.entered.notified().await;
    }

    pub fn release(&self) {
        self.state.release.notify_one();
    }
}

/// Uploader whose outcomes are scripted by the test.
///
/// Failures registered with [`fail_for`](Self::fail_for) apply to one id
/// until cleared; failures queued with [`fail_next`](Self::fail_next) are
/// consumed one per upload, in order. Everything else succeeds.
#[derive(Default)]
pub struct ScriptedUploader {
    calls: Mutex<Vec<String>>,
    queued_failures: Mutex<VecDeque<SyncError>>,
    failures_by_id: Mutex<HashMap<String, SyncError>>,
    gate: Mutex<Option<Arc<GateState>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: SyncError) {
        self.queued_failures.lock().push_back(error);
    }

    pub fn fail_for(&self, submission_id: &str, error: SyncError) {
        self.failures_by_id.lock().insert(submission_id.to_string(), error);
    }

    pub fn clear_failures(&self) {
        self.queued_failures.lock().clear();
        self.failures_by_id.lock().clear();
    }

    /// Block the next upload until the returned gate is released.
    pub fn hold(&self) -> UploadGate {
        let state = Arc::new(GateState { entered: Notify::new(), release: Notify::new() });
        *self.gate.lock() = Some(Arc::clone(&state));
        UploadGate { state }
    }

    /// Ids in the order uploads started, repeats included.
    pub fn uploaded_ids(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn max_observed_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionUploader for ScriptedUploader {
    async fn upload(&self, submission: &Submission) -> Result<(), SyncError> {
        self.calls.lock().push(submission.id.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        tokio::task::yield_now().await;

        let scripted = self
            .failures_by_id
            .lock()
            .get(&submission.id)
            .cloned()
            .or_else(|| self.queued_failures.lock().pop_front());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        scripted.map_or(Ok(()), Err)
    }
}

/// Metadata store backed by a `HashMap`.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
