//! Queueing service - accepts new submissions and keeps the queue tidy

use std::sync::Arc;

use chrono::Duration;
use fieldsync_common::time::SharedClock;
use fieldsync_domain::{
    EventKind, FieldSyncError, InvalidStateTransition, NewSubmission, QueueConfig, QueueStats,
    Result, StatusKind, Submission, SubmissionFilter, Transition,
};
use tracing::{info, instrument, warn};

use crate::events::EventBus;
use crate::sync::ports::SubmissionRepository;

/// Submission queueing service
pub struct SubmissionService {
    repository: Arc<dyn SubmissionRepository>,
    events: EventBus,
    clock: SharedClock,
    queue: QueueConfig,
}

impl SubmissionService {
    pub fn new(
        repository: Arc<dyn SubmissionRepository>,
        events: EventBus,
        clock: SharedClock,
        queue: QueueConfig,
    ) -> Self {
        Self { repository, events, clock, queue }
    }

    /// Persist a new submission as `Pending`.
    ///
    /// # Errors
    /// `QueueFull` when `max_queue_size` unsynced submissions are already
    /// queued; storage errors otherwise.
    #[instrument(skip(self, new), fields(submission_type = %new.submission_type, team = new.team_number))]
    pub async fn queue_submission(&self, new: NewSubmission) -> Result<Submission> {
        let stats = self.repository.stats().await?;
        if stats.unsynced() >= self.queue.max_queue_size {
            warn!(limit = self.queue.max_queue_size, "Queue full, rejecting submission");
            return Err(FieldSyncError::QueueFull { limit: self.queue.max_queue_size });
        }

        let submission = Submission::create(new, self.clock.now());
        self.repository.save(&submission).await?;
        info!(submission_id = %submission.id, "Submission queued");

        self.events.publish(EventKind::Queued {
            submission_id: submission.id.clone(),
            submission_type: submission.submission_type,
        });
        self.publish_queue_state().await;
        Ok(submission)
    }

    pub async fn get(&self, id: &str) -> Result<Submission> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| FieldSyncError::NotFound(format!("submission {id}")))
    }

    pub async fn list(&self, filter: &SubmissionFilter) -> Result<Vec<Submission>> {
        Ok(self.repository.find_all(filter).await?)
    }

    /// Remove a submission regardless of its state.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.repository.delete(id).await? {
            return Err(FieldSyncError::NotFound(format!("submission {id}")));
        }
        self.events.publish(EventKind::SubmissionDeleted { submission_id: id.to_string() });
        self.publish_queue_state().await;
        Ok(())
    }

    /// Delete a terminal failure once the user has seen it.
    #[instrument(skip(self))]
    pub async fn acknowledge_failure(&self, id: &str) -> Result<()> {
        let submission = self.get(id).await?;
        if !submission.is_terminal() {
            return Err(InvalidStateTransition {
                from: submission.status_kind(),
                action: Transition::Acknowledge,
            }
            .into());
        }
        self.delete(id).await
    }

    /// Delete every submission created more than `retention` ago.
    pub async fn cleanup_older_than(&self, retention: Duration) -> Result<usize> {
        let cutoff = self.clock.now() - retention;
        let removed = self.repository.delete_older_than(cutoff).await?;
        if removed > 0 {
            info!(removed, cutoff = %cutoff, "Removed expired submissions");
            self.publish_queue_state().await;
        }
        Ok(removed)
    }

    /// Apply the configured `retention_days`.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        self.cleanup_older_than(Duration::days(i64::from(self.queue.retention_days))).await
    }

    /// Delete every submission the remote has already accepted.
    pub async fn cleanup_succeeded(&self) -> Result<usize> {
        let done = self.repository.find_all(&SubmissionFilter::with_status(StatusKind::Success)).await?;
        let mut removed = 0;
        for submission in &done {
            if self.repository.delete(&submission.id).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Removed synced submissions");
            self.publish_queue_state().await;
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        Ok(self.repository.stats().await?)
    }

    async fn publish_queue_state(&self) {
        match self.repository.stats().await {
            Ok(stats) => {
                self.events.publish(EventKind::QueueStateChanged { stats });
            }
            Err(err) => warn!(error = %err, "Failed to compute queue stats"),
        }
    }
}
