//! Sync coordinator: drains the local queue to the remote service.
//!
//! One coordinator owns the single-flight guard for full queue runs and the
//! optional periodic auto-sync task. Per item it drives the submission state
//! machine, persists every transition, and publishes an event for each one.
//!
//! Items in a batch are uploaded with bounded concurrency
//! (`buffer_unordered`); they are dispatched in priority order and may
//! complete in any order. One item's failure never aborts its siblings; only
//! a storage quota error stops the remaining batches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use fieldsync_common::sync::retry::RetryStrategy;
use fieldsync_common::time::SharedClock;
use fieldsync_domain::constants::{
    DEFAULT_AUTO_SYNC_INTERVAL_MS, DEFAULT_BATCH_SIZE, DEFAULT_INLINE_RETRIES,
    DEFAULT_MAX_CONCURRENCY,
};
use fieldsync_domain::{
    EventKind, FieldSyncError, QueueStats, Result, StatusKind, Submission, SubmissionFilter,
    SyncConfig, SyncReport, SyncStatus, SyncTrigger,
};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::events::EventBus;
use crate::sync::ports::{AssumeOnline, ConnectivityProbe, SubmissionRepository, SubmissionUploader};

/// Tuning knobs for a [`SyncCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Items per batch
    pub batch_size: usize,
    /// Uploads in flight at once within a batch
    pub max_concurrency: usize,
    /// Period of the auto-sync task
    pub auto_sync_interval: Duration,
    /// Extra attempts inside one run before the failure is persisted
    pub inline_retries: u32,
    /// How long `stop` waits for the auto-sync task to wind down
    pub join_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            auto_sync_interval: Duration::from_millis(DEFAULT_AUTO_SYNC_INTERVAL_MS),
            inline_retries: DEFAULT_INLINE_RETRIES,
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&SyncConfig> for CoordinatorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
            auto_sync_interval: config.auto_sync_interval(),
            inline_retries: config.inline_retries,
            ..Self::default()
        }
    }
}

struct BackgroundTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Clears the in-flight flag when a run ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok().map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives queued submissions through upload with retry and event publication.
pub struct SyncCoordinator {
    repository: Arc<dyn SubmissionRepository>,
    uploader: Arc<dyn SubmissionUploader>,
    connectivity: Arc<dyn ConnectivityProbe>,
    events: EventBus,
    retry: Arc<RetryStrategy>,
    inline_retry: RetryStrategy,
    clock: SharedClock,
    config: CoordinatorConfig,
    in_flight: AtomicBool,
    background: Mutex<Option<BackgroundTask>>,
}

impl SyncCoordinator {
    pub fn new(
        repository: Arc<dyn SubmissionRepository>,
        uploader: Arc<dyn SubmissionUploader>,
        events: EventBus,
        retry: Arc<RetryStrategy>,
        clock: SharedClock,
        mut config: CoordinatorConfig,
    ) -> Self {
        config.batch_size = config.batch_size.max(1);
        config.max_concurrency = config.max_concurrency.max(1);
        let inline_retry = retry.with_max_retries(config.inline_retries);
        Self {
            repository,
            uploader,
            connectivity: Arc::new(AssumeOnline),
            events,
            retry,
            inline_retry,
            clock,
            config,
            in_flight: AtomicBool::new(false),
            background: Mutex::new(None),
        }
    }

    /// Replace the default [`AssumeOnline`] probe.
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityProbe>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn retry_strategy(&self) -> Arc<RetryStrategy> {
        Arc::clone(&self.retry)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// A full queue run is in progress.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// The auto-sync task is armed.
    pub fn is_running(&self) -> bool {
        self.background.lock().is_some()
    }

    pub async fn is_online(&self) -> bool {
        self.connectivity.is_online().await
    }

    // ------------------------------------------------------------------
    // Queue runs
    // ------------------------------------------------------------------

    /// Upload every pending submission and every failure whose backoff has
    /// elapsed.
    ///
    /// A call made while another run is in flight returns an empty report
    /// immediately.
    pub async fn sync_pending(&self) -> Result<SyncReport> {
        self.run(SyncTrigger::Manual).await
    }

    /// Like [`sync_pending`](Self::sync_pending), but retryable failures are
    /// picked up even if their backoff has not elapsed yet.
    pub async fn force_sync(&self) -> Result<SyncReport> {
        self.run(SyncTrigger::Forced).await
    }

    #[instrument(skip(self))]
    async fn run(&self, trigger: SyncTrigger) -> Result<SyncReport> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("Sync already in progress, skipping");
            return Ok(SyncReport::empty());
        };

        let started = Instant::now();
        if !self.connectivity.is_online().await {
            info!("Device appears offline, attempting sync anyway");
        }
        self.events.publish(EventKind::SyncStarted { trigger });

        let outcome = self.drain(trigger == SyncTrigger::Forced).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(mut report) => {
                report.duration_ms = duration_ms;
                info!(
                    attempted = report.attempted,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    duration_ms,
                    "Sync run completed"
                );
                self.events.publish(EventKind::SyncCompleted {
                    attempted: report.attempted,
                    succeeded: report.succeeded,
                    failed: report.failed,
                    duration_ms,
                });
                Ok(report)
            }
            Err(err) => {
                error!(error = %err, duration_ms, "Sync run aborted");
                self.events.publish(EventKind::SyncFailed { error: err.to_string() });
                Err(err)
            }
        };

        self.publish_queue_state().await;
        result
    }

    async fn drain(&self, force: bool) -> Result<SyncReport> {
        let mut candidates = self.load_candidates(force).await?;
        if candidates.is_empty() {
            debug!("Nothing to sync");
            return Ok(SyncReport::empty());
        }

        candidates.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at))
        });
        info!(count = candidates.len(), force, "Syncing queued submissions");

        self.sync_batch(candidates).await
    }

    async fn load_candidates(&self, force: bool) -> Result<Vec<Submission>> {
        let now = self.clock.now();
        let mut candidates = self.repository.find_pending().await?;
        let failed = self.repository.find_all(&SubmissionFilter::retryable_failures()).await?;

        for submission in failed {
            if force {
                let rescheduled = submission.reschedule()?;
                self.repository.update(&rescheduled).await?;
                candidates.push(rescheduled);
            } else if submission.is_retry_due(now) {
                candidates.push(submission);
            }
        }

        Ok(candidates)
    }

    /// Upload `submissions` in chunks of `batch_size`, at most
    /// `max_concurrency` at a time.
    ///
    /// Items that cannot start syncing (already succeeded, terminal, still
    /// backing off) are skipped. Per-item failures land in the report; a
    /// quota error aborts the remaining batches and is returned.
    pub async fn sync_batch(&self, submissions: Vec<Submission>) -> Result<SyncReport> {
        let mut report = SyncReport::empty();
        let total_batches = submissions.len().div_ceil(self.config.batch_size);

        for (index, chunk) in submissions.chunks(self.config.batch_size).enumerate() {
            debug!(batch = index + 1, total_batches, size = chunk.len(), "Processing batch");

            let results: Vec<(String, Result<Submission>)> = stream::iter(chunk.to_vec())
                .map(|submission| async move {
                    let result = self.sync(&submission).await;
                    (submission.id, result)
                })
                .buffer_unordered(self.config.max_concurrency)
                .collect()
                .await;

            let mut quota_error = None;
            for (id, result) in results {
                match result {
                    Ok(updated) => match &updated.sync_status {
                        SyncStatus::Success { .. } => report.record_success(id),
                        SyncStatus::Failed { error, .. } => report.record_failure(id, error.clone()),
                        SyncStatus::Pending | SyncStatus::Syncing { .. } => {}
                    },
                    Err(FieldSyncError::InvalidTransition(err)) => {
                        debug!(submission_id = %id, error = %err, "Skipping submission");
                    }
                    Err(FieldSyncError::Database(err)) if err.is_quota_exceeded() => {
                        report.record_failure(id, err.to_string());
                        quota_error = Some(err);
                    }
                    Err(err) => {
                        warn!(submission_id = %id, error = %err, "Submission sync failed");
                        report.record_failure(id, err.to_string());
                    }
                }
            }

            if let Some(err) = quota_error {
                error!(
                    remaining_batches = total_batches - index - 1,
                    "Storage quota exceeded, aborting remaining batches"
                );
                return Err(err.into());
            }
        }

        Ok(report)
    }

    /// Upload one submission and persist the outcome.
    ///
    /// Upload failures are not errors here: the returned submission carries
    /// the `Failed` state. Errors are reserved for illegal transitions and
    /// storage failures.
    #[instrument(skip(self, submission), fields(submission_id = %submission.id))]
    pub async fn sync(&self, submission: &Submission) -> Result<Submission> {
        let syncing = submission.mark_as_syncing(self.clock.now())?;
        self.repository.update(&syncing).await?;

        let SyncStatus::Syncing { attempt } = syncing.sync_status else {
            return Err(FieldSyncError::Internal("submission left syncing state".to_string()));
        };

        let uploader = &self.uploader;
        let target = &syncing;
        let outcome = self
            .inline_retry
            .execute_with_retry(
                |_| uploader.upload(target),
                |retry| {
                    debug!(
                        attempt = retry.attempt,
                        delay_ms = u64::try_from(retry.delay.as_millis()).unwrap_or(u64::MAX),
                        "Retrying upload within run"
                    );
                },
            )
            .await;

        let now = self.clock.now();
        match outcome {
            Ok(()) => {
                let done = syncing.mark_as_success(now)?;
                self.persist_outcome(&syncing, &done).await?;
                debug!(attempt, "Submission synced");
                self.events.publish(EventKind::SubmissionSuccess {
                    submission_id: done.id.clone(),
                    attempt,
                });
                Ok(done)
            }
            Err(err) => {
                let err = err.with_attempt(attempt);
                let failed = syncing.mark_as_failed(&err, &self.retry, now)?;
                self.persist_outcome(&syncing, &failed).await?;

                let terminal = failed.is_terminal();
                warn!(attempt, terminal, error = %err, "Submission upload failed");
                self.events.publish(EventKind::SubmissionFailed {
                    submission_id: failed.id.clone(),
                    error: err.describe(),
                    attempt,
                    terminal,
                });
                if !terminal {
                    self.events.publish(EventKind::SubmissionRetrying {
                        submission_id: failed.id.clone(),
                        attempt: failed.retry_count + 1,
                        next_retry_at: failed.next_retry_at(),
                    });
                }
                Ok(failed)
            }
        }
    }

    /// Persist the post-upload state. When that write fails the row is put
    /// back to `Pending` so a later run picks it up again instead of leaving
    /// it in `Syncing`.
    async fn persist_outcome(&self, syncing: &Submission, outcome: &Submission) -> Result<()> {
        let Err(err) = self.repository.update(outcome).await else {
            return Ok(());
        };

        warn!(error = %err, "Failed to persist upload outcome, returning submission to pending");
        match syncing.abandon() {
            Ok(pending) => {
                if let Err(revert) = self.repository.update(&pending).await {
                    error!(error = %revert, "Submission left in syncing state until recovery");
                }
            }
            Err(transition) => error!(error = %transition, "Cannot return submission to pending"),
        }
        Err(err.into())
    }

    /// Sync one submission by id, outside the single-flight guard.
    ///
    /// A retryable failure is rescheduled first so the user does not wait for
    /// its backoff. Terminal failures need [`Submission::reset`] first.
    pub async fn sync_one(&self, id: &str) -> Result<Submission> {
        let submission = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| FieldSyncError::NotFound(format!("submission {id}")))?;

        let submission = match submission.sync_status {
            SyncStatus::Failed { terminal: false, .. } => submission.reschedule()?,
            _ => submission,
        };

        let result = self.sync(&submission).await;
        self.publish_queue_state().await;
        result
    }

    /// Per-status counts of the queue.
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        Ok(self.repository.stats().await?)
    }

    pub(crate) async fn publish_queue_state(&self) {
        match self.queue_stats().await {
            Ok(stats) => {
                self.events.publish(EventKind::QueueStateChanged { stats });
            }
            Err(err) => warn!(error = %err, "Failed to compute queue stats"),
        }
    }

    /// Return submissions stuck in `Syncing` (the process stopped mid-upload)
    /// to `Pending`.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let stuck = self.repository.find_all(&SubmissionFilter::with_status(StatusKind::Syncing)).await?;
        for submission in &stuck {
            let pending = submission.abandon()?;
            self.repository.update(&pending).await?;
        }
        if !stuck.is_empty() {
            info!(count = stuck.len(), "Recovered interrupted submissions");
        }
        Ok(stuck.len())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Run one sync immediately, then every `auto_sync_interval` until
    /// [`stop`](Self::stop).
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.is_running() {
            return Err(FieldSyncError::Lifecycle("auto-sync already running".to_string()));
        }

        if let Err(err) = self.recover_interrupted().await {
            warn!(error = %err, "Failed to recover interrupted submissions");
        }

        let cancel = CancellationToken::new();
        let period = self.config.auto_sync_interval;
        let handle = tokio::spawn(Self::auto_sync_loop(Arc::downgrade(self), period, cancel.clone()));

        let mut background = self.background.lock();
        if background.is_some() {
            cancel.cancel();
            handle.abort();
            return Err(FieldSyncError::Lifecycle("auto-sync already running".to_string()));
        }
        *background = Some(BackgroundTask { cancel, handle });
        info!(interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "Auto-sync started");
        Ok(())
    }

    /// Disarm the auto-sync task. A run already in progress is allowed to
    /// finish.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let Some(task) = self.background.lock().take() else {
            return Err(FieldSyncError::Lifecycle("auto-sync not running".to_string()));
        };

        task.cancel.cancel();
        match tokio::time::timeout(self.config.join_timeout, task.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Auto-sync task ended abnormally"),
            Err(_) => warn!("Auto-sync task still finishing a run, detaching"),
        }

        info!("Auto-sync stopped");
        Ok(())
    }

    async fn auto_sync_loop(coordinator: Weak<Self>, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Auto-sync loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(coordinator) = coordinator.upgrade() else {
                        debug!("Coordinator dropped, ending auto-sync loop");
                        break;
                    };
                    if let Err(err) = coordinator.run(SyncTrigger::Scheduled).await {
                        warn!(error = %err, "Scheduled sync failed");
                    }
                }
            }
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.background.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use chrono::Duration as ChronoDuration;
    use fieldsync_common::sync::retry::RetryConfig;
    use fieldsync_common::time::{Clock, MockClock};
    use fieldsync_domain::{
        DatabaseError, EventType, NewSubmission, Priority, SubmissionType, SyncError,
    };
    use serde_json::json;

    use super::*;
    use crate::testing::{InMemorySubmissionRepository, ScriptedUploader};

    struct Harness {
        coordinator: Arc<SyncCoordinator>,
        repository: Arc<InMemorySubmissionRepository>,
        uploader: Arc<ScriptedUploader>,
        events: EventBus,
        clock: MockClock,
    }

    fn harness_with(config: CoordinatorConfig, retry: RetryConfig) -> Harness {
        let clock = MockClock::new();
        let repository = Arc::new(InMemorySubmissionRepository::new());
        let uploader = Arc::new(ScriptedUploader::new());
        let events = EventBus::new(Arc::new(clock.clone()));
        let coordinator = Arc::new(SyncCoordinator::new(
            repository.clone(),
            uploader.clone(),
            events.clone(),
            Arc::new(RetryStrategy::new(retry).unwrap()),
            Arc::new(clock.clone()),
            config,
        ));
        Harness { coordinator, repository, uploader, events, clock }
    }

    fn harness() -> Harness {
        harness_with(CoordinatorConfig::default(), RetryConfig::default().without_jitter())
    }

    async fn queue(h: &Harness, team: u32, priority: Priority) -> Submission {
        let submission = Submission::create(
            NewSubmission::new(SubmissionType::MatchScouting, team, "2024casj", json!({"team": team}))
                .with_priority(priority),
            h.clock.now(),
        );
        h.repository.save(&submission).await.unwrap();
        h.clock.advance(ChronoDuration::milliseconds(1));
        submission
    }

    fn event_types(events: &EventBus) -> Vec<EventType> {
        events.history(None).iter().map(|e| e.event_type()).collect()
    }

    /// Validates twelve pending items with batch size 10 and concurrency 3
    /// are all uploaded exactly once.
    #[tokio::test]
    async fn sync_pending_uploads_every_item_across_batches() {
        let h = harness();
        for team in 0..12 {
            queue(&h, 100 + team, Priority::Normal).await;
        }

        let report = h.coordinator.sync_pending().await.unwrap();

        assert_eq!(report.attempted, 12);
        assert_eq!(report.succeeded, 12);
        assert_eq!(h.uploader.call_count(), 12);
        assert_eq!(h.uploader.max_observed_concurrency(), 3);
        assert_eq!(h.coordinator.queue_stats().await.unwrap().succeeded, 12);
    }

    #[tokio::test]
    async fn empty_queue_completes_with_zero_counts() {
        let h = harness();

        let report = h.coordinator.sync_pending().await.unwrap();

        assert_eq!(report.attempted, 0);
        let history = h.events.history(None);
        assert!(matches!(
            history[1].kind,
            EventKind::SyncCompleted { attempted: 0, succeeded: 0, .. }
        ));
        assert_eq!(
            event_types(&h.events),
            vec![EventType::SyncStarted, EventType::SyncCompleted, EventType::QueueStateChanged]
        );
    }

    #[tokio::test]
    async fn higher_priority_items_are_dispatched_first() {
        let h = harness_with(
            CoordinatorConfig { max_concurrency: 1, ..Default::default() },
            RetryConfig::default(),
        );
        let low = queue(&h, 1, Priority::Low).await;
        let normal = queue(&h, 2, Priority::Normal).await;
        let critical = queue(&h, 3, Priority::Critical).await;

        h.coordinator.sync_pending().await.unwrap();

        assert_eq!(h.uploader.uploaded_ids(), vec![critical.id, normal.id, low.id]);
    }

    #[tokio::test]
    async fn server_error_schedules_retry_and_publishes_retrying() {
        let h = harness();
        let submission = queue(&h, 254, Priority::Normal).await;
        h.uploader.fail_next(SyncError::http(503, "Service Unavailable"));

        let report = h.coordinator.sync_pending().await.unwrap();

        assert_eq!(report.failed, 1);
        let stored = h.repository.find_by_id(&submission.id).await.unwrap().unwrap();
        assert!(!stored.is_terminal());
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.next_retry_at(), Some(h.clock.now() + ChronoDuration::seconds(1)));

        let types = event_types(&h.events);
        assert!(types.contains(&EventType::SubmissionFailed));
        assert!(types.contains(&EventType::SubmissionRetrying));
    }

    #[tokio::test]
    async fn unauthorized_is_terminal_on_first_attempt() {
        let h = harness();
        let submission = queue(&h, 971, Priority::Normal).await;
        h.uploader.fail_next(SyncError::http(401, "Unauthorized"));

        h.coordinator.sync_pending().await.unwrap();

        let stored = h.repository.find_by_id(&submission.id).await.unwrap().unwrap();
        assert!(stored.is_terminal());
        assert_eq!(stored.retry_count, 1);
        assert!(!event_types(&h.events).contains(&EventType::SubmissionRetrying));

        h.clock.advance(ChronoDuration::days(1));
        let report = h.coordinator.sync_pending().await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(h.uploader.call_count(), 1);
    }

    #[tokio::test]
    async fn backoff_is_respected_across_runs() {
        let h = harness();
        queue(&h, 1114, Priority::Normal).await;
        h.uploader.fail_next(SyncError::network("connection refused"));

        h.coordinator.sync_pending().await.unwrap();
        let early = h.coordinator.sync_pending().await.unwrap();
        assert_eq!(early.attempted, 0);

        h.clock.advance(ChronoDuration::seconds(1));
        let due = h.coordinator.sync_pending().await.unwrap();
        assert_eq!(due.succeeded, 1);
        assert_eq!(h.uploader.call_count(), 2);
    }

    #[tokio::test]
    async fn force_sync_ignores_backoff_but_not_terminal_failures() {
        let h = harness();
        let soft = queue(&h, 1, Priority::Normal).await;
        let hard = queue(&h, 2, Priority::Normal).await;
        h.uploader.fail_for(&soft.id, SyncError::timeout("slow"));
        h.uploader.fail_for(&hard.id, SyncError::http(403, "Forbidden"));
        h.coordinator.sync_pending().await.unwrap();
        h.uploader.clear_failures();

        let report = h.coordinator.force_sync().await.unwrap();

        assert_eq!(report.succeeded_ids, vec![soft.id]);
        let hard = h.repository.find_by_id(&hard.id).await.unwrap().unwrap();
        assert!(hard.is_terminal());
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_siblings() {
        let h = harness();
        let a = queue(&h, 1, Priority::Normal).await;
        let b = queue(&h, 2, Priority::Normal).await;
        let c = queue(&h, 3, Priority::Normal).await;
        h.uploader.fail_for(&b.id, SyncError::http(400, "Bad Request"));

        let report = h.coordinator.sync_pending().await.unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed_ids, vec![b.id.clone()]);
        assert!(report.succeeded_ids.contains(&a.id));
        assert!(report.succeeded_ids.contains(&c.id));
        assert_eq!(report.errors[0].submission_id, b.id);
    }

    #[tokio::test]
    async fn concurrent_run_returns_empty_report() {
        let h = harness();
        queue(&h, 1, Priority::Normal).await;
        let gate = h.uploader.hold();

        let coordinator = Arc::clone(&h.coordinator);
        let first = tokio::spawn(async move { coordinator.sync_pending().await });
        gate.wait_until_entered().await;

        assert!(h.coordinator.is_syncing());
        let second = h.coordinator.sync_pending().await.unwrap();
        assert_eq!(second.attempted, 0);

        gate.release();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.succeeded, 1);
        assert!(!h.coordinator.is_syncing());
    }

    #[tokio::test]
    async fn quota_exceeded_aborts_run_with_sync_failed() {
        let h = harness_with(
            CoordinatorConfig { batch_size: 2, max_concurrency: 1, ..Default::default() },
            RetryConfig::default(),
        );
        for team in 0..5 {
            queue(&h, team, Priority::Normal).await;
        }
        h.repository.fail_updates_with(DatabaseError::quota_exceeded("disk full"));

        let err = h.coordinator.sync_pending().await.unwrap_err();

        assert!(matches!(err, FieldSyncError::Database(ref e) if e.is_quota_exceeded()));
        assert_eq!(h.uploader.call_count(), 0);
        assert!(event_types(&h.events).contains(&EventType::SyncFailed));
        assert!(!h.coordinator.is_syncing());
    }

    /// Validates a submission whose upload outcome cannot be written is
    /// picked up again by the next run.
    ///
    /// Assertions:
    /// - the failed write is reported against that submission
    /// - the row is back to `Pending` rather than stuck in `Syncing`
    /// - the next run uploads it again and it ends in `Success`
    #[tokio::test]
    async fn unpersisted_outcome_returns_submission_to_pending() {
        let h = harness();
        let submission = queue(&h, 5940, Priority::Normal).await;
        h.repository.fail_nth_update(2, DatabaseError::operation_failed("transient write failure"));

        let first = h.coordinator.sync_pending().await.unwrap();

        assert_eq!(first.failed_ids, vec![submission.id.clone()]);
        let stored = h.repository.find_by_id(&submission.id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.retry_count, 0);

        let second = h.coordinator.sync_pending().await.unwrap();

        assert_eq!(second.succeeded_ids, vec![submission.id.clone()]);
        assert_eq!(h.uploader.call_count(), 2);
        let stored = h.repository.find_by_id(&submission.id).await.unwrap().unwrap();
        assert!(matches!(stored.sync_status, SyncStatus::Success { .. }));
    }

    #[tokio::test]
    async fn zero_batch_size_and_concurrency_are_clamped() {
        let h = harness_with(
            CoordinatorConfig { batch_size: 0, max_concurrency: 0, ..Default::default() },
            RetryConfig::default(),
        );
        for team in 0..3 {
            queue(&h, team, Priority::Normal).await;
        }

        let report = h.coordinator.sync_pending().await.unwrap();

        assert_eq!(report.succeeded, 3);
        assert_eq!(h.uploader.max_observed_concurrency(), 1);
    }

    #[tokio::test]
    async fn inline_retries_attempt_within_one_run() {
        let h = harness_with(
            CoordinatorConfig { inline_retries: 2, ..Default::default() },
            RetryConfig { base_delay_ms: 1, max_delay_ms: 2, jitter_ms: 0, ..Default::default() },
        );
        let submission = queue(&h, 1, Priority::Normal).await;
        h.uploader.fail_next(SyncError::network("reset"));
        h.uploader.fail_next(SyncError::network("reset"));

        let report = h.coordinator.sync_pending().await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(h.uploader.call_count(), 3);
        let stored = h.repository.find_by_id(&submission.id).await.unwrap().unwrap();
        assert_eq!(stored.retry_count, 0);
    }

    #[tokio::test]
    async fn network_failures_exhaust_retry_budget() {
        let h = harness_with(
            CoordinatorConfig::default(),
            RetryConfig { max_retries: 3, jitter_ms: 0, ..Default::default() },
        );
        let submission = queue(&h, 1, Priority::Normal).await;
        for _ in 0..5 {
            h.uploader.fail_next(SyncError::network("offline"));
        }

        for _ in 0..6 {
            h.coordinator.sync_pending().await.unwrap();
            h.clock.advance(ChronoDuration::minutes(2));
        }

        assert_eq!(h.uploader.call_count(), 4);
        let stored = h.repository.find_by_id(&submission.id).await.unwrap().unwrap();
        assert!(stored.is_terminal());
        assert_eq!(stored.retry_count, 4);
    }

    #[tokio::test]
    async fn sync_one_reschedules_and_reports_not_found() {
        let h = harness();
        let submission = queue(&h, 1, Priority::Normal).await;
        h.uploader.fail_next(SyncError::http(502, "Bad Gateway"));
        h.coordinator.sync_pending().await.unwrap();

        let synced = h.coordinator.sync_one(&submission.id).await.unwrap();
        assert!(matches!(synced.sync_status, SyncStatus::Success { .. }));

        let err = h.coordinator.sync_one("missing").await.unwrap_err();
        assert!(matches!(err, FieldSyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn recover_interrupted_returns_syncing_items_to_pending() {
        let h = harness();
        let submission = queue(&h, 1, Priority::Normal).await;
        let stuck = submission.mark_as_syncing(h.clock.now()).unwrap();
        h.repository.update(&stuck).await.unwrap();

        assert_eq!(h.coordinator.recover_interrupted().await.unwrap(), 1);
        let stored = h.repository.find_by_id(&submission.id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn start_runs_immediately_and_stop_disarms() {
        let h = harness_with(
            CoordinatorConfig { auto_sync_interval: Duration::from_secs(3600), ..Default::default() },
            RetryConfig::default(),
        );
        queue(&h, 1, Priority::Normal).await;
        let completed = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&completed);
        h.events.subscribe(EventType::SyncCompleted, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        h.coordinator.start().await.unwrap();
        assert!(h.coordinator.is_running());
        assert!(matches!(h.coordinator.start().await, Err(FieldSyncError::Lifecycle(_))));

        tokio::time::timeout(Duration::from_secs(2), async {
            while completed.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(h.uploader.call_count(), 1);

        h.coordinator.stop().await.unwrap();
        assert!(!h.coordinator.is_running());
        assert!(matches!(h.coordinator.stop().await, Err(FieldSyncError::Lifecycle(_))));
    }
}
