//! Key/value metadata (last sync time and similar markers).

use std::sync::Arc;

use async_trait::async_trait;
use fieldsync_core::MetadataStore;
use fieldsync_domain::DatabaseError;
use rusqlite::{params, OptionalExtension};
use tokio::task;

use super::manager::DbManager;
use crate::errors::IntoDatabaseError;

pub struct SqliteMetadataStore {
    db: Arc<DbManager>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(IntoDatabaseError::into_database_error)
        })
        .await
        .map_err(IntoDatabaseError::into_database_error)?
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let db = Arc::clone(&self.db);
        let (key, value) = (key.to_string(), value.to_string());
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO metadata (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value],
            )
            .map(|_| ())
            .map_err(IntoDatabaseError::into_database_error)
        })
        .await
        .map_err(IntoDatabaseError::into_database_error)?
    }
}
