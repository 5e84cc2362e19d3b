//! Versioned schema migrations tracked through `PRAGMA user_version`.
//!
//! Each migration runs in its own transaction together with the version
//! bump, so a failed step leaves the database at the previous version. The
//! first failure stops the run; earlier steps stay applied.

use fieldsync_domain::DatabaseError;
use rusqlite::Connection;
use tracing::{info, instrument, warn};

use crate::errors::IntoDatabaseError;

/// One schema step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
    /// Reverts `up`; only used by [`MigrationRunner::rollback_to`]
    pub down: Option<&'static str>,
}

/// Built-in schema for the submission store.
pub fn builtin_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "submissions table",
            up: "CREATE TABLE submissions (
                    id TEXT PRIMARY KEY NOT NULL,
                    submission_type TEXT NOT NULL,
                    team_number INTEGER NOT NULL,
                    event_key TEXT NOT NULL,
                    match_key TEXT,
                    payload TEXT NOT NULL,
                    headers TEXT NOT NULL DEFAULT '{}',
                    status TEXT NOT NULL,
                    sync_state TEXT NOT NULL,
                    terminal INTEGER NOT NULL DEFAULT 0,
                    next_retry_at TEXT,
                    last_error TEXT,
                    created_at TEXT NOT NULL,
                    retry_count INTEGER NOT NULL DEFAULT 0,
                    last_attempt_at TEXT,
                    priority TEXT NOT NULL DEFAULT 'normal',
                    priority_rank INTEGER NOT NULL DEFAULT 1
                );
                CREATE INDEX idx_submissions_status ON submissions(status);
                CREATE INDEX idx_submissions_type ON submissions(submission_type);
                CREATE INDEX idx_submissions_team ON submissions(team_number);
                CREATE INDEX idx_submissions_match ON submissions(match_key);
                CREATE INDEX idx_submissions_created_at ON submissions(created_at);",
            down: Some("DROP TABLE IF EXISTS submissions;"),
        },
        Migration {
            version: 2,
            description: "metadata key/value table",
            up: "CREATE TABLE metadata (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );",
            down: Some("DROP TABLE IF EXISTS metadata;"),
        },
        Migration {
            version: 3,
            description: "status/type compound index",
            up: "CREATE INDEX idx_submissions_status_type ON submissions(status, submission_type);",
            down: Some("DROP INDEX IF EXISTS idx_submissions_status_type;"),
        },
    ]
}

/// Applies [`Migration`]s in version order.
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    migrations: Vec<Migration>,
}

impl MigrationRunner {
    /// Sort `migrations` by version.
    ///
    /// # Errors
    /// `SchemaError` when two migrations share a version or a version is 0.
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self, DatabaseError> {
        migrations.sort_by_key(|m| m.version);

        if migrations.first().is_some_and(|m| m.version == 0) {
            return Err(DatabaseError::schema("migration version 0 is reserved"));
        }

        for pair in migrations.windows(2) {
            let (prev, next) = (pair[0].version, pair[1].version);
            if prev == next {
                return Err(DatabaseError::schema(format!("duplicate migration version {next}")));
            }
            if next != prev + 1 {
                warn!(from = prev, to = next, "gap in migration versions");
            }
        }

        Ok(Self { migrations })
    }

    /// Highest version known to this runner (0 when empty).
    pub fn latest_version(&self) -> u32 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
        conn.query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(IntoDatabaseError::into_database_error)
    }

    /// Migrations with `current < version <= target`, ascending.
    pub fn pending(&self, current: u32, target: u32) -> Vec<Migration> {
        self.migrations
            .iter()
            .filter(|m| m.version > current && m.version <= target)
            .copied()
            .collect()
    }

    /// Apply everything up to [`latest_version`](Self::latest_version).
    pub fn migrate(&self, conn: &mut Connection) -> Result<Vec<u32>, DatabaseError> {
        self.migrate_to(conn, self.latest_version())
    }

    /// Apply pending migrations up to and including `target`.
    ///
    /// # Errors
    /// `MigrationFailed` carrying the version of the first step that failed.
    #[instrument(skip(self, conn))]
    pub fn migrate_to(&self, conn: &mut Connection, target: u32) -> Result<Vec<u32>, DatabaseError> {
        let current = Self::current_version(conn)?;
        let pending = self.pending(current, target);
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let mut applied = Vec::with_capacity(pending.len());
        for migration in pending {
            apply(conn, migration.version, migration.up).map_err(|e| {
                DatabaseError::migration_failed(migration.version, e.message)
            })?;
            info!(version = migration.version, description = migration.description, "migration applied");
            applied.push(migration.version);
        }
        Ok(applied)
    }

    /// Run `down` scripts, newest first, until the database is at `target`.
    ///
    /// Returns the versions that were reverted.
    ///
    /// # Errors
    /// `MigrationFailed` for the first step without a `down` script or whose
    /// script fails; steps reverted before it stay reverted.
    #[instrument(skip(self, conn))]
    pub fn rollback_to(&self, conn: &mut Connection, target: u32) -> Result<Vec<u32>, DatabaseError> {
        let current = Self::current_version(conn)?;
        let mut reverting = self.pending(target, current);
        reverting.reverse();

        let mut reverted = Vec::with_capacity(reverting.len());
        for migration in reverting {
            let Some(down) = migration.down else {
                return Err(DatabaseError::migration_failed(
                    migration.version,
                    "rollback: migration has no down script",
                ));
            };
            let previous = self
                .migrations
                .iter()
                .map(|m| m.version)
                .filter(|v| *v < migration.version)
                .max()
                .unwrap_or(0)
                .max(target);
            apply(conn, previous, down).map_err(|e| {
                DatabaseError::migration_failed(migration.version, format!("rollback: {}", e.message))
            })?;
            warn!(version = migration.version, "migration rolled back");
            reverted.push(migration.version);
        }
        Ok(reverted)
    }
}

fn apply(conn: &mut Connection, version_after: u32, sql: &str) -> Result<(), DatabaseError> {
    let tx = conn.transaction().map_err(IntoDatabaseError::into_database_error)?;
    tx.execute_batch(sql).map_err(IntoDatabaseError::into_database_error)?;
    tx.execute_batch(&format!("PRAGMA user_version = {version_after}"))
        .map_err(IntoDatabaseError::into_database_error)?;
    tx.commit().map_err(IntoDatabaseError::into_database_error)
}
