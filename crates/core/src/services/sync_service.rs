//! Sync façade - manual triggers, retry of failures and auto-sync control

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use fieldsync_common::time::SharedClock;
use fieldsync_domain::constants::METADATA_LAST_SYNC_AT;
use fieldsync_domain::{
    FieldSyncError, QueueStats, Result, StatusKind, Submission, SubmissionFilter, SyncReport,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::sync::coordinator::SyncCoordinator;
use crate::sync::ports::{MetadataStore, SubmissionRepository};

/// Point-in-time view of the sync engine for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatusSnapshot {
    pub is_syncing: bool,
    pub is_online: bool,
    pub auto_sync_running: bool,
    pub stats: QueueStats,
    pub last_report: Option<SyncReport>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

pub struct SyncService {
    coordinator: Arc<SyncCoordinator>,
    repository: Arc<dyn SubmissionRepository>,
    metadata: Arc<dyn MetadataStore>,
    clock: SharedClock,
    enable_background_sync: bool,
    last_report: Mutex<Option<SyncReport>>,
}

impl SyncService {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        repository: Arc<dyn SubmissionRepository>,
        metadata: Arc<dyn MetadataStore>,
        clock: SharedClock,
        enable_background_sync: bool,
    ) -> Self {
        Self {
            coordinator,
            repository,
            metadata,
            clock,
            enable_background_sync,
            last_report: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub async fn sync_now(&self) -> Result<SyncReport> {
        let report = self.coordinator.sync_pending().await?;
        self.record(&report).await;
        Ok(report)
    }

    pub async fn force_sync(&self) -> Result<SyncReport> {
        let report = self.coordinator.force_sync().await?;
        self.record(&report).await;
        Ok(report)
    }

    pub async fn sync_one(&self, id: &str) -> Result<Submission> {
        self.coordinator.sync_one(id).await
    }

    /// Reset a failure (terminal included) to `Pending` and upload it now.
    #[instrument(skip(self))]
    pub async fn retry_failed(&self, id: &str) -> Result<Submission> {
        let submission = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| FieldSyncError::NotFound(format!("submission {id}")))?;
        let reset = submission.reset()?;
        self.repository.update(&reset).await?;
        self.coordinator.sync_one(id).await
    }

    /// Reset every failure to `Pending`, then run a normal sync.
    #[instrument(skip(self))]
    pub async fn retry_all_failed(&self) -> Result<SyncReport> {
        let failed = self
            .repository
            .find_all(&SubmissionFilter::with_status(StatusKind::Failed))
            .await?;
        for submission in &failed {
            self.repository.update(&submission.reset()?).await?;
        }
        info!(reset = failed.len(), "Failed submissions reset for retry");
        self.sync_now().await
    }

    /// Arm the periodic sync task.
    ///
    /// Returns `false` without starting anything when background sync is
    /// disabled in configuration.
    pub async fn start_auto_sync(&self) -> Result<bool> {
        if !self.enable_background_sync {
            info!("Background sync disabled, auto-sync not started");
            return Ok(false);
        }
        self.coordinator.start().await?;
        Ok(true)
    }

    pub async fn stop_auto_sync(&self) -> Result<()> {
        self.coordinator.stop().await
    }

    pub async fn status(&self) -> Result<SyncStatusSnapshot> {
        Ok(SyncStatusSnapshot {
            is_syncing: self.coordinator.is_syncing(),
            is_online: self.coordinator.is_online().await,
            auto_sync_running: self.coordinator.is_running(),
            stats: self.coordinator.queue_stats().await?,
            last_report: self.last_report(),
            last_sync_at: self.last_sync_at().await?,
        })
    }

    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.lock().clone()
    }

    /// Completion time of the last manual run, as persisted in metadata.
    pub async fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.metadata.get(METADATA_LAST_SYNC_AT).await? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Ok(Some(at.with_timezone(&Utc))),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring unparseable last sync timestamp");
                Ok(None)
            }
        }
    }

    async fn record(&self, report: &SyncReport) {
        *self.last_report.lock() = Some(report.clone());
        if report.attempted == 0 {
            return;
        }
        let now = self.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Err(e) = self.metadata.set(METADATA_LAST_SYNC_AT, &now).await {
            warn!(error = %e, "Failed to persist last sync time");
        } else {
            debug!(at = %now, "Last sync time recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use fieldsync_common::sync::retry::{RetryConfig, RetryStrategy};
    use fieldsync_common::time::{Clock, MockClock};
    use fieldsync_domain::{NewSubmission, SubmissionType, SyncError, SyncStatus};
    use serde_json::json;

    use super::*;
    use crate::events::EventBus;
    use crate::sync::coordinator::CoordinatorConfig;
    use crate::testing::{InMemoryMetadataStore, InMemorySubmissionRepository, ScriptedUploader};

    struct Fixture {
        service: SyncService,
        repository: Arc<InMemorySubmissionRepository>,
        uploader: Arc<ScriptedUploader>,
        metadata: Arc<InMemoryMetadataStore>,
        clock: MockClock,
    }

    fn fixture(enable_background_sync: bool) -> Fixture {
        let clock = MockClock::new();
        let repository = Arc::new(InMemorySubmissionRepository::new());
        let uploader = Arc::new(ScriptedUploader::new());
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let coordinator = Arc::new(SyncCoordinator::new(
            repository.clone(),
            uploader.clone(),
            EventBus::new(Arc::new(clock.clone())),
            Arc::new(RetryStrategy::new(RetryConfig::default().without_jitter()).unwrap()),
            Arc::new(clock.clone()),
            CoordinatorConfig::default(),
        ));
        let service = SyncService::new(
            coordinator,
            repository.clone(),
            metadata.clone(),
            Arc::new(clock.clone()),
            enable_background_sync,
        );
        Fixture { service, repository, uploader, metadata, clock }
    }

    async fn queue(f: &Fixture, team: u32) -> Submission {
        let submission = Submission::create(
            NewSubmission::new(SubmissionType::PitScouting, team, "2024txhou", json!({"drive": "swerve"})),
            f.clock.now(),
        );
        f.repository.save(&submission).await.unwrap();
        submission
    }

    #[tokio::test]
    async fn sync_now_records_report_and_timestamp() {
        let f = fixture(true);
        queue(&f, 254).await;

        let report = f.service.sync_now().await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(f.service.last_report(), Some(report));
        assert_eq!(f.service.last_sync_at().await.unwrap(), Some(f.clock.now()));
        assert!(f.metadata.get(METADATA_LAST_SYNC_AT).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_run_does_not_touch_last_sync_time() {
        let f = fixture(true);

        f.service.sync_now().await.unwrap();

        assert!(f.service.last_report().is_some());
        assert_eq!(f.service.last_sync_at().await.unwrap(), None);
    }

    #[tokio::test]
    async fn retry_failed_revives_terminal_failure() {
        let f = fixture(true);
        let submission = queue(&f, 1678).await;
        f.uploader.fail_next(SyncError::http(400, "Bad payload"));
        f.service.sync_now().await.unwrap();
        let failed = f.repository.find_by_id(&submission.id).await.unwrap().unwrap();
        assert!(failed.is_terminal());

        let synced = f.service.retry_failed(&submission.id).await.unwrap();

        assert!(matches!(synced.sync_status, SyncStatus::Success { .. }));
        assert_eq!(synced.retry_count, 1);
    }

    #[tokio::test]
    async fn retry_failed_rejects_pending_submission() {
        let f = fixture(true);
        let submission = queue(&f, 1678).await;

        let err = f.service.retry_failed(&submission.id).await.unwrap_err();
        assert!(matches!(err, FieldSyncError::InvalidTransition(_)));
        assert!(matches!(
            f.service.retry_failed("missing").await,
            Err(FieldSyncError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn retry_all_failed_resets_and_syncs_everything() {
        let f = fixture(true);
        let a = queue(&f, 1).await;
        let b = queue(&f, 2).await;
        f.uploader.fail_for(&a.id, SyncError::http(503, "Service Unavailable"));
        f.uploader.fail_for(&b.id, SyncError::http(403, "Forbidden"));
        f.service.sync_now().await.unwrap();
        f.uploader.clear_failures();

        let report = f.service.retry_all_failed().await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(f.service.status().await.unwrap().stats.succeeded, 2);
    }

    #[tokio::test]
    async fn start_auto_sync_honours_configuration() {
        let disabled = fixture(false);
        assert!(!disabled.service.start_auto_sync().await.unwrap());
        assert!(!disabled.service.status().await.unwrap().auto_sync_running);

        let enabled = fixture(true);
        assert!(enabled.service.start_auto_sync().await.unwrap());
        assert!(enabled.service.status().await.unwrap().auto_sync_running);
        enabled.service.stop_auto_sync().await.unwrap();
        assert!(!enabled.service.status().await.unwrap().auto_sync_running);
    }

    #[tokio::test]
    async fn status_reports_queue_and_connectivity() {
        let f = fixture(true);
        queue(&f, 5).await;

        let status = f.service.status().await.unwrap();

        assert!(!status.is_syncing);
        assert!(status.is_online);
        assert_eq!(status.stats.pending, 1);
        assert_eq!(status.last_report, None);
    }
}
