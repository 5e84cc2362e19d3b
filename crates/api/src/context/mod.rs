//! Application context - dependency injection container

use std::fs;
use std::path::Path;
use std::sync::Arc;

use fieldsync_common::sync::retry::RetryStrategy;
use fieldsync_common::time::{SharedClock, SystemClock};
use fieldsync_core::{
    ConnectivityProbe, CoordinatorConfig, EventBus, SubmissionService, SyncCoordinator,
    SyncService,
};
use fieldsync_domain::{Config, FieldSyncError, Result};
use fieldsync_infra::{
    DbManager, HttpConnectivityProbe, HttpSubmissionUploader, SqliteMetadataStore,
    SqliteSubmissionRepository,
};
use tracing::{info, warn};

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub events: EventBus,
    pub submissions: Arc<SubmissionService>,
    pub sync: Arc<SyncService>,
}

impl AppContext {
    /// Build the context from a configuration using the system clock.
    ///
    /// # Errors
    /// `Config` for an invalid configuration, `Database` when the store
    /// cannot be opened or migrated.
    pub fn new_with_config(config: Config) -> Result<Self> {
        Self::new_with_clock(config, SystemClock::shared())
    }

    /// Build the context with an injected clock.
    pub fn new_with_clock(config: Config, clock: SharedClock) -> Result<Self> {
        config.validate()?;

        let db_path = Path::new(&config.database.path);
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                FieldSyncError::Config(format!(
                    "cannot create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let db = Arc::new(DbManager::new(db_path, config.database.pool_size)?);
        let applied = db.run_migrations()?;
        let schema_version = db.schema_version()?;
        info!(db_path = %db_path.display(), applied = applied.len(), schema_version, "database ready");

        let repository = Arc::new(SqliteSubmissionRepository::new(Arc::clone(&db)));
        let metadata = Arc::new(SqliteMetadataStore::new(Arc::clone(&db)));
        let events = EventBus::new(Arc::clone(&clock));

        let uploader = Arc::new(HttpSubmissionUploader::from_config(&config.sync)?);
        let retry = RetryStrategy::new(config.sync.retry.clone())
            .map_err(|e| FieldSyncError::Config(format!("sync.retry: {e}")))?;

        let mut coordinator = SyncCoordinator::new(
            repository.clone(),
            uploader,
            events.clone(),
            Arc::new(retry),
            Arc::clone(&clock),
            CoordinatorConfig::from(&config.sync),
        );
        if let Some(url) = config.sync.connectivity_url.as_deref() {
            let probe: Arc<dyn ConnectivityProbe> = Arc::new(HttpConnectivityProbe::new(url)?);
            coordinator = coordinator.with_connectivity(probe);
        }
        let coordinator = Arc::new(coordinator);

        let submissions = Arc::new(SubmissionService::new(
            repository.clone(),
            events.clone(),
            Arc::clone(&clock),
            config.queue.clone(),
        ));
        let sync = Arc::new(SyncService::new(
            coordinator,
            repository,
            metadata,
            clock,
            config.sync.enable_background_sync,
        ));

        Ok(Self { config, db, events, submissions, sync })
    }

    /// Startup housekeeping, then arm auto-sync when it is enabled.
    ///
    /// Returns whether auto-sync is now running.
    pub async fn start(&self) -> Result<bool> {
        match self.submissions.cleanup_expired().await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Removed submissions past retention"),
            Err(err) => warn!(error = %err, "Retention cleanup failed"),
        }

        let started = self.sync.start_auto_sync().await?;
        if !started {
            // Auto-sync recovers interrupted uploads itself when it starts
            self.sync.coordinator().recover_interrupted().await?;
        }
        Ok(started)
    }

    /// Stop auto-sync if it is running. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<()> {
        if self.sync.coordinator().is_running() {
            self.sync.stop_auto_sync().await?;
        }
        info!("FieldSync shut down");
        Ok(())
    }
}
