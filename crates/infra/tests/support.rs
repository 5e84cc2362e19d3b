//! Shared fixtures for infra integration tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use fieldsync_domain::{NewSubmission, Priority, Submission, SubmissionType};
use fieldsync_infra::database::{DbManager, SqliteMetadataStore, SqliteSubmissionRepository};
use serde_json::json;
use tempfile::TempDir;

/// Temporary on-disk database that lives as long as the value.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    temp_dir: TempDir,
}

impl TestDatabase {
    /// Fresh database with the built-in schema applied.
    pub fn new() -> Self {
        let db = Self::unmigrated();
        db.manager.run_migrations().expect("migrations should apply");
        db
    }

    /// Fresh database with no schema.
    pub fn unmigrated() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let manager =
            DbManager::new(temp_dir.path().join("fieldsync.db"), 4).expect("db manager should be created");
        Self { manager: Arc::new(manager), temp_dir }
    }

    /// Open a second manager over the same file.
    pub fn reopen(&self) -> Arc<DbManager> {
        Arc::new(
            DbManager::new(self.temp_dir.path().join("fieldsync.db"), 2)
                .expect("db manager should reopen"),
        )
    }

    pub fn repository(&self) -> Arc<SqliteSubmissionRepository> {
        Arc::new(SqliteSubmissionRepository::new(Arc::clone(&self.manager)))
    }

    pub fn metadata(&self) -> Arc<SqliteMetadataStore> {
        Arc::new(SqliteMetadataStore::new(Arc::clone(&self.manager)))
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed instant the fixtures are created around.
pub fn event_day() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 19, 15, 0, 0).unwrap()
}

pub fn match_submission(team: u32, created_at: DateTime<Utc>) -> Submission {
    Submission::create(
        NewSubmission::new(
            SubmissionType::MatchScouting,
            team,
            "2024cmptx",
            json!({"teleop": {"speaker": 7, "amp": 2}, "endgame": "onstage"}),
        )
        .with_match_key("2024cmptx_qm42")
        .with_priority(Priority::High)
        .with_header("x-scout-id", "tablet-3"),
        created_at,
    )
}
