//! Database connection manager backed by an r2d2 SQLite pool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fieldsync_domain::DatabaseError;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::{debug, info};

use super::migrations::{builtin_migrations, MigrationRunner};
use crate::errors::IntoDatabaseError;

/// Pool of SQLite connections to the submission store.
pub type SqlitePool = r2d2::Pool<SqliteConnectionManager>;

/// Connection checked out of a [`SqlitePool`].
pub type SqliteConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the connection pool for one database file.
pub struct DbManager {
    pool: SqlitePool,
    path: PathBuf,
}

impl DbManager {
    /// Open (creating if needed) the database at `db_path`.
    ///
    /// Every pooled connection runs in WAL mode with a busy timeout so
    /// concurrent readers and the single writer do not fail fast.
    pub fn new<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<Self, DatabaseError> {
        let path = db_path.as_ref().to_path_buf();

        let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            debug!(journal_mode = %mode, "sqlite connection initialised");
            Ok(())
        });

        let pool = r2d2::Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)
            .map_err(IntoDatabaseError::into_database_error)?;

        info!(db_path = %path.display(), max_connections = pool.max_size(), "sqlite pool initialised");

        Ok(Self { pool, path })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<SqliteConnection, DatabaseError> {
        self.pool.get().map_err(IntoDatabaseError::into_database_error)
    }

    /// Bring the schema up to the latest built-in version.
    ///
    /// Returns the versions applied by this call.
    pub fn run_migrations(&self) -> Result<Vec<u32>, DatabaseError> {
        let runner = MigrationRunner::new(builtin_migrations())?;
        let mut conn = self.get_connection()?;
        runner.migrate(&mut conn)
    }

    /// Schema version recorded in the database file.
    pub fn schema_version(&self) -> Result<u32, DatabaseError> {
        let conn = self.get_connection()?;
        MigrationRunner::current_version(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify the database is reachable and answering queries.
    pub fn health_check(&self) -> Result<(), DatabaseError> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0))
            .map_err(IntoDatabaseError::into_database_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn migrations_reach_latest_version() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(temp_dir.path().join("test.db"), 2).expect("manager created");

        let applied = manager.run_migrations().expect("migrations run");

        assert_eq!(applied, vec![1, 2, 3]);
        assert_eq!(manager.schema_version().unwrap(), 3);
        assert!(manager.run_migrations().unwrap().is_empty());
    }

    #[test]
    fn health_check_succeeds_for_valid_database() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(temp_dir.path().join("test.db"), 2).expect("manager created");

        manager.health_check().expect("health check passed");
    }

    #[test]
    fn zero_pool_size_is_clamped() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(temp_dir.path().join("test.db"), 0).expect("manager created");

        assert_eq!(manager.pool().max_size(), 1);
    }
}
