//! Conversions from external infrastructure errors into domain errors.
//!
//! The domain error types live in `fieldsync-domain`, so `From` impls for
//! `rusqlite`, `r2d2` and `reqwest` errors cannot be written there. These
//! extension traits keep the mapping rules on the infrastructure side.

use fieldsync_domain::{DatabaseError, SyncError};
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use tokio::task::JoinError;

/// Map a storage-layer failure onto [`DatabaseError`].
pub trait IntoDatabaseError {
    fn into_database_error(self) -> DatabaseError;
}

/// Map a transport-layer failure onto [`SyncError`].
pub trait IntoSyncError {
    fn into_sync_error(self) -> SyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → DatabaseError */
/* -------------------------------------------------------------------------- */

impl IntoDatabaseError for SqlError {
    fn into_database_error(self) -> DatabaseError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_else(|| err.to_string());
                match err.code {
                    ErrorCode::DiskFull => DatabaseError::quota_exceeded(message),
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                        DatabaseError::connection_failed(format!("database is busy: {message}"))
                    }
                    ErrorCode::CannotOpen | ErrorCode::NotADatabase => {
                        DatabaseError::connection_failed(message)
                    }
                    ErrorCode::DatabaseCorrupt | ErrorCode::SchemaChanged => {
                        DatabaseError::schema(message)
                    }
                    ErrorCode::ConstraintViolation => {
                        DatabaseError::operation_failed(format!("constraint violation: {message}"))
                    }
                    _ => DatabaseError::operation_failed(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::FromSqlConversionFailure(_, _, cause) => {
                DatabaseError::deserialization(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                DatabaseError::deserialization(format!("invalid column type for {name}: {ty}"))
            }
            RE::Utf8Error(..) => {
                DatabaseError::deserialization("invalid UTF-8 returned from sqlite")
            }
            RE::InvalidPath(path) => DatabaseError::connection_failed(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => DatabaseError::operation_failed(other.to_string()),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → DatabaseError */
/* -------------------------------------------------------------------------- */

impl IntoDatabaseError for r2d2::Error {
    fn into_database_error(self) -> DatabaseError {
        DatabaseError::connection_failed(format!("connection pool: {self}"))
    }
}

impl IntoDatabaseError for JoinError {
    fn into_database_error(self) -> DatabaseError {
        if self.is_cancelled() {
            DatabaseError::operation_failed("database task cancelled")
        } else {
            DatabaseError::operation_failed(format!("database task panicked: {self}"))
        }
    }
}

impl IntoDatabaseError for serde_json::Error {
    fn into_database_error(self) -> DatabaseError {
        DatabaseError::deserialization(format!("invalid JSON column: {self}"))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → SyncError */
/* -------------------------------------------------------------------------- */

impl IntoSyncError for HttpError {
    fn into_sync_error(self) -> SyncError {
        if self.is_timeout() {
            return SyncError::timeout(format!("HTTP request timed out: {self}"));
        }

        if self.is_builder() {
            return SyncError::validation(format!("invalid request: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            return SyncError::http(code, status.canonical_reason().unwrap_or("unknown status"));
        }

        if self.is_connect() {
            return SyncError::network(format!("connection failure: {self}"));
        }

        if self.is_decode() || self.is_body() {
            return SyncError::unknown(format!("invalid response: {self}"));
        }

        SyncError::network(self.to_string())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use fieldsync_domain::{DatabaseErrorKind, SyncErrorKind};
    use reqwest::{Client, StatusCode};
    use rusqlite::ffi::{Error as FfiError, ErrorCode};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn sqlite_failure(code: ErrorCode, extended_code: i32) -> SqlError {
        SqlError::SqliteFailure(FfiError { code, extended_code }, Some("boom".into()))
    }

    #[test]
    fn disk_full_maps_to_quota_exceeded() {
        let mapped = sqlite_failure(ErrorCode::DiskFull, 13).into_database_error();
        assert!(mapped.is_quota_exceeded());
    }

    #[test]
    fn busy_database_is_a_retryable_connection_failure() {
        let mapped = sqlite_failure(ErrorCode::DatabaseBusy, 5).into_database_error();
        assert_eq!(mapped.kind, DatabaseErrorKind::ConnectionFailed);
        assert!(mapped.message.contains("busy"));
    }

    #[test]
    fn unique_violation_maps_to_operation_failed() {
        let mapped = sqlite_failure(ErrorCode::ConstraintViolation, 1555).into_database_error();
        assert_eq!(mapped.kind, DatabaseErrorKind::OperationFailed);
    }

    #[tokio::test]
    async fn http_status_503_maps_to_recoverable_sync_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::SERVICE_UNAVAILABLE))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        let mapped = error.into_sync_error();
        assert_eq!(mapped.kind, SyncErrorKind::Http);
        assert_eq!(mapped.status, Some(503));
        assert!(mapped.recoverable);
    }

    #[tokio::test]
    async fn refused_connection_maps_to_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(format!("http://{addr}")).send().await.unwrap_err();

        let mapped = error.into_sync_error();
        assert_eq!(mapped.kind, SyncErrorKind::Network);
        assert!(mapped.recoverable);
    }
}
