//! SQLite-backed implementation of the submission repository port.
//!
//! Each call checks a connection out of the pool inside `spawn_blocking`.
//! Timestamps are stored as fixed-width RFC 3339 text with nanoseconds so
//! string order equals time order. The full [`SyncStatus`] is kept as JSON in
//! `sync_state`; `status`, `terminal` and `next_retry_at` are denormalised
//! copies used for filtering.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use fieldsync_core::SubmissionRepository;
use fieldsync_domain::{
    DatabaseError, Priority, QueueStats, StatusKind, Submission, SubmissionFilter, SubmissionType,
    SyncStatus,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use tokio::task;
use tracing::{debug, instrument};

use super::manager::DbManager;
use crate::errors::IntoDatabaseError;

const SELECT_COLUMNS: &str = "id, submission_type, team_number, event_key, match_key, payload, \
     headers, sync_state, created_at, retry_count, last_attempt_at, priority";

const INSERT_SQL: &str = "INSERT INTO submissions (
        id, submission_type, team_number, event_key, match_key, payload, headers, status,
        sync_state, terminal, next_retry_at, last_error, created_at, retry_count,
        last_attempt_at, priority, priority_rank
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)";

const UPDATE_SQL: &str = "UPDATE submissions SET
        submission_type = ?2, team_number = ?3, event_key = ?4, match_key = ?5, payload = ?6,
        headers = ?7, status = ?8, sync_state = ?9, terminal = ?10, next_retry_at = ?11,
        last_error = ?12, created_at = ?13, retry_count = ?14, last_attempt_at = ?15,
        priority = ?16, priority_rank = ?17
    WHERE id = ?1";

const ORDER_BY: &str = " ORDER BY priority_rank DESC, created_at ASC, id ASC";

/// Submission store over the pooled SQLite database.
pub struct SqliteSubmissionRepository {
    db: Arc<DbManager>,
}

impl SqliteSubmissionRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            op(&conn)
        })
        .await
        .map_err(IntoDatabaseError::into_database_error)?
    }
}

#[async_trait]
impl SubmissionRepository for SqliteSubmissionRepository {
    #[instrument(skip(self, submission), fields(submission_id = %submission.id))]
    async fn save(&self, submission: &Submission) -> Result<(), DatabaseError> {
        let row = EncodedSubmission::encode(submission)?;
        self.blocking(move |conn| {
            conn.execute(INSERT_SQL, row.params().as_slice())
                .map_err(IntoDatabaseError::into_database_error)?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Submission>, DatabaseError> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM submissions WHERE id = ?1");
            let mut stmt = conn.prepare(&sql).map_err(IntoDatabaseError::into_database_error)?;
            let mut rows = stmt
                .query_map(params![id], StoredRow::read)
                .map_err(IntoDatabaseError::into_database_error)?;
            let first = rows.next().transpose().map_err(IntoDatabaseError::into_database_error)?;
            first.map(StoredRow::decode).transpose()
        })
        .await
    }

    async fn find_pending(&self) -> Result<Vec<Submission>, DatabaseError> {
        self.find_all(&SubmissionFilter::with_status(StatusKind::Pending)).await
    }

    async fn find_all(&self, filter: &SubmissionFilter) -> Result<Vec<Submission>, DatabaseError> {
        let (where_sql, mut values) = where_clause(filter);
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM submissions{where_sql}{ORDER_BY}");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(usize_to_i64(limit)));
        }

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(IntoDatabaseError::into_database_error)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), StoredRow::read)
                .map_err(IntoDatabaseError::into_database_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(IntoDatabaseError::into_database_error)?;
            rows.into_iter().map(StoredRow::decode).collect()
        })
        .await
    }

    #[instrument(skip(self, submission), fields(submission_id = %submission.id, status = %submission.status_kind()))]
    async fn update(&self, submission: &Submission) -> Result<(), DatabaseError> {
        let row = EncodedSubmission::encode(submission)?;
        self.blocking(move |conn| {
            let changed = conn
                .execute(UPDATE_SQL, row.params().as_slice())
                .map_err(IntoDatabaseError::into_database_error)?;
            if changed == 0 {
                return Err(DatabaseError::operation_failed(format!(
                    "submission {} does not exist",
                    row.id
                )));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
        let id = id.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM submissions WHERE id = ?1", params![id])
                .map(|changed| changed > 0)
                .map_err(IntoDatabaseError::into_database_error)
        })
        .await
    }

    async fn count(&self, filter: &SubmissionFilter) -> Result<usize, DatabaseError> {
        let (where_sql, values) = where_clause(filter);
        self.blocking(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM submissions{where_sql}");
            let count: i64 = conn
                .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
                .map_err(IntoDatabaseError::into_database_error)?;
            Ok(i64_to_usize(count))
        })
        .await
    }

    /// Removes rows with `created_at < cutoff`; a row created exactly at the
    /// cutoff is kept.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let cutoff = encode_timestamp(&cutoff);
        self.blocking(move |conn| {
            let removed = conn
                .execute("DELETE FROM submissions WHERE created_at < ?1", params![cutoff])
                .map_err(IntoDatabaseError::into_database_error)?;
            debug!(removed, cutoff = %cutoff, "deleted old submissions");
            Ok(removed)
        })
        .await
    }

    async fn clear(&self) -> Result<usize, DatabaseError> {
        self.blocking(|conn| {
            conn.execute("DELETE FROM submissions", [])
                .map_err(IntoDatabaseError::into_database_error)
        })
        .await
    }

    /// One grouped query instead of a count per bucket.
    async fn stats(&self) -> Result<QueueStats, DatabaseError> {
        self.blocking(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT status, terminal, COUNT(*) FROM submissions GROUP BY status, terminal",
                )
                .map_err(IntoDatabaseError::into_database_error)?;
            let groups = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?, row.get::<_, i64>(2)?))
                })
                .map_err(IntoDatabaseError::into_database_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(IntoDatabaseError::into_database_error)?;

            let mut stats = QueueStats::default();
            for (status, terminal, count) in groups {
                let count = i64_to_usize(count);
                let kind = status.parse::<StatusKind>().map_err(DatabaseError::deserialization)?;
                match (kind, terminal) {
                    (StatusKind::Pending, _) => stats.pending += count,
                    (StatusKind::Syncing, _) => stats.syncing += count,
                    (StatusKind::Success, _) => stats.succeeded += count,
                    (StatusKind::Failed, true) => stats.terminal += count,
                    (StatusKind::Failed, false) => stats.failed += count,
                }
                stats.total += count;
            }
            Ok(stats)
        })
        .await
    }
}

// ============================================================================
// Row encoding
// ============================================================================

struct EncodedSubmission {
    id: String,
    submission_type: &'static str,
    team_number: i64,
    event_key: String,
    match_key: Option<String>,
    payload: String,
    headers: String,
    status: &'static str,
    sync_state: String,
    terminal: bool,
    next_retry_at: Option<String>,
    last_error: Option<String>,
    created_at: String,
    retry_count: i64,
    last_attempt_at: Option<String>,
    priority: &'static str,
    priority_rank: i64,
}

impl EncodedSubmission {
    fn encode(submission: &Submission) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: submission.id.clone(),
            submission_type: submission.submission_type.as_str(),
            team_number: i64::from(submission.team_number),
            event_key: submission.event_key.clone(),
            match_key: submission.match_key.clone(),
            payload: serde_json::to_string(&submission.payload)
                .map_err(IntoDatabaseError::into_database_error)?,
            headers: serde_json::to_string(&submission.headers)
                .map_err(IntoDatabaseError::into_database_error)?,
            status: submission.status_kind().as_str(),
            sync_state: serde_json::to_string(&submission.sync_status)
                .map_err(IntoDatabaseError::into_database_error)?,
            terminal: submission.is_terminal(),
            next_retry_at: submission.next_retry_at().as_ref().map(encode_timestamp),
            last_error: submission.last_error().map(str::to_string),
            created_at: encode_timestamp(&submission.created_at),
            retry_count: i64::from(submission.retry_count),
            last_attempt_at: submission.last_attempt_at.as_ref().map(encode_timestamp),
            priority: submission.priority.as_str(),
            priority_rank: submission.priority.rank(),
        })
    }

    fn params(&self) -> [&dyn rusqlite::ToSql; 17] {
        [
            &self.id,
            &self.submission_type,
            &self.team_number,
            &self.event_key,
            &self.match_key,
            &self.payload,
            &self.headers,
            &self.status,
            &self.sync_state,
            &self.terminal,
            &self.next_retry_at,
            &self.last_error,
            &self.created_at,
            &self.retry_count,
            &self.last_attempt_at,
            &self.priority,
            &self.priority_rank,
        ]
    }
}

struct StoredRow {
    id: String,
    submission_type: String,
    team_number: i64,
    event_key: String,
    match_key: Option<String>,
    payload: String,
    headers: String,
    sync_state: String,
    created_at: String,
    retry_count: i64,
    last_attempt_at: Option<String>,
    priority: String,
}

impl StoredRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            submission_type: row.get(1)?,
            team_number: row.get(2)?,
            event_key: row.get(3)?,
            match_key: row.get(4)?,
            payload: row.get(5)?,
            headers: row.get(6)?,
            sync_state: row.get(7)?,
            created_at: row.get(8)?,
            retry_count: row.get(9)?,
            last_attempt_at: row.get(10)?,
            priority: row.get(11)?,
        })
    }

    fn decode(self) -> Result<Submission, DatabaseError> {
        let corrupt = |field: &str, detail: String| {
            DatabaseError::deserialization(format!("submission {}: bad {field}: {detail}", self.id))
        };

        let submission_type = self
            .submission_type
            .parse::<SubmissionType>()
            .map_err(|e| corrupt("submission_type", e))?;
        let priority = self.priority.parse::<Priority>().map_err(|e| corrupt("priority", e))?;
        let team_number =
            u32::try_from(self.team_number).map_err(|e| corrupt("team_number", e.to_string()))?;
        let retry_count =
            u32::try_from(self.retry_count).map_err(|e| corrupt("retry_count", e.to_string()))?;
        let payload: serde_json::Value =
            serde_json::from_str(&self.payload).map_err(|e| corrupt("payload", e.to_string()))?;
        let headers: BTreeMap<String, String> =
            serde_json::from_str(&self.headers).map_err(|e| corrupt("headers", e.to_string()))?;
        let sync_status: SyncStatus = serde_json::from_str(&self.sync_state)
            .map_err(|e| corrupt("sync_state", e.to_string()))?;
        let created_at = decode_timestamp(&self.created_at)?;
        let last_attempt_at = self.last_attempt_at.as_deref().map(decode_timestamp).transpose()?;

        Ok(Submission {
            id: self.id,
            submission_type,
            team_number,
            event_key: self.event_key,
            match_key: self.match_key,
            payload,
            headers,
            sync_status,
            created_at,
            retry_count,
            last_attempt_at,
            priority,
        })
    }
}

fn where_clause(filter: &SubmissionFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut values = Vec::new();

    if let Some(submission_type) = filter.submission_type {
        clauses.push("submission_type = ?");
        values.push(Value::Text(submission_type.as_str().to_string()));
    }
    if let Some(team) = filter.team_number {
        clauses.push("team_number = ?");
        values.push(Value::Integer(i64::from(team)));
    }
    if let Some(event_key) = &filter.event_key {
        clauses.push("event_key = ?");
        values.push(Value::Text(event_key.clone()));
    }
    if let Some(match_key) = &filter.match_key {
        clauses.push("match_key = ?");
        values.push(Value::Text(match_key.clone()));
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(terminal) = filter.terminal {
        clauses.push("terminal = ?");
        values.push(Value::Integer(i64::from(terminal)));
    }
    if let Some(priority) = filter.priority {
        clauses.push("priority = ?");
        values.push(Value::Text(priority.as_str().to_string()));
    }
    if let Some(after) = &filter.created_after {
        clauses.push("created_at >= ?");
        values.push(Value::Text(encode_timestamp(after)));
    }
    if let Some(before) = &filter.created_before {
        clauses.push("created_at < ?");
        values.push(Value::Text(encode_timestamp(before)));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn encode_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| DatabaseError::deserialization(format!("bad timestamp {raw:?}: {e}")))
}

fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn i64_to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}
