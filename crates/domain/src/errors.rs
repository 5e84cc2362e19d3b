//! Error types used throughout the application

use fieldsync_common::error::{ErrorClassification, ErrorSeverity};
use fieldsync_common::sync::retry::{is_retryable_status, is_terminal_message};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{StatusKind, Transition};

/// Main error type for FieldSync
#[derive(Error, Debug)]
pub enum FieldSyncError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidStateTransition),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Queue is full: {limit} unsynced submissions already queued")]
    QueueFull { limit: usize },

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for FieldSync operations
pub type Result<T> = std::result::Result<T, FieldSyncError>;

impl ErrorClassification for FieldSyncError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Database(e) => e.is_retryable(),
            Self::Sync(e) => e.is_retryable(),
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Database(e) => e.severity(),
            Self::Sync(e) => e.severity(),
            Self::InvalidTransition(_) | Self::NotFound(_) | Self::QueueFull { .. } => {
                ErrorSeverity::Warning
            }
            Self::Config(_) | Self::Lifecycle(_) => ErrorSeverity::Error,
            Self::Internal(_) => ErrorSeverity::Critical,
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Category of a local store failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseErrorKind {
    ConnectionFailed,
    SchemaError,
    QuotaExceeded,
    OperationFailed,
    DeserializationError,
    MigrationFailed,
}

crate::impl_domain_status_conversions!(DatabaseErrorKind {
    ConnectionFailed => "connection_failed",
    SchemaError => "schema_error",
    QuotaExceeded => "quota_exceeded",
    OperationFailed => "operation_failed",
    DeserializationError => "deserialization_error",
    MigrationFailed => "migration_failed",
});

/// Failure reported by the submission store
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    pub message: String,
    /// Schema version that failed, for [`DatabaseErrorKind::MigrationFailed`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), version: None }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::ConnectionFailed, message)
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::SchemaError, message)
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::QuotaExceeded, message)
    }

    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::OperationFailed, message)
    }

    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::DeserializationError, message)
    }

    pub fn migration_failed(version: u32, message: impl Into<String>) -> Self {
        Self { version: Some(version), ..Self::new(DatabaseErrorKind::MigrationFailed, message) }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        self.kind == DatabaseErrorKind::QuotaExceeded
    }
}

impl ErrorClassification for DatabaseError {
    fn is_retryable(&self) -> bool {
        self.kind == DatabaseErrorKind::ConnectionFailed
    }

    fn severity(&self) -> ErrorSeverity {
        match self.kind {
            DatabaseErrorKind::SchemaError | DatabaseErrorKind::MigrationFailed => {
                ErrorSeverity::Critical
            }
            DatabaseErrorKind::ConnectionFailed => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

// ============================================================================
// Sync
// ============================================================================

/// Category of an upload failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Connection refused, DNS failure, reset by peer
    Network,
    /// Request did not complete in time
    Timeout,
    /// Remote answered with a non-2xx status
    Http,
    /// Submission cannot be sent as-is (no endpoint, unserializable payload)
    Validation,
    /// Local store failed while recording the outcome
    Storage,
    Unknown,
}

crate::impl_domain_status_conversions!(SyncErrorKind {
    Network => "network",
    Timeout => "timeout",
    Http => "http",
    Validation => "validation",
    Storage => "storage",
    Unknown => "unknown",
});

/// Failure of a single upload attempt
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct SyncError {
    pub kind: SyncErrorKind,
    pub message: String,
    /// Attempt number the failure belongs to (1-based, 0 when unknown)
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub recoverable: bool,
}

impl SyncError {
    fn build(kind: SyncErrorKind, message: String, recoverable: bool) -> Self {
        Self { kind, message, attempt: 0, status: None, recoverable }
    }

    /// Transport failure; retryable unless the message carries a terminal phrase.
    pub fn network(message: impl Into<String>) -> Self {
        let message = message.into();
        let recoverable = !is_terminal_message(&message);
        Self::build(SyncErrorKind::Network, message, recoverable)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::build(SyncErrorKind::Timeout, message.into(), true)
    }

    /// Non-2xx response; 5xx, 429 and 408 are retryable, other statuses terminal.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        let recoverable = is_retryable_status(status);
        Self { status: Some(status), ..Self::build(SyncErrorKind::Http, message.into(), recoverable) }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::build(SyncErrorKind::Validation, message.into(), false)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::build(SyncErrorKind::Storage, message.into(), false)
    }

    /// Unclassified failure; terminal phrases make it permanent.
    pub fn unknown(message: impl Into<String>) -> Self {
        let message = message.into();
        let recoverable = !is_terminal_message(&message);
        Self::build(SyncErrorKind::Unknown, message, recoverable)
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Text persisted on the submission and shown to the user.
    pub fn describe(&self) -> String {
        match self.status {
            Some(status) => format!("HTTP {status}: {}", self.message),
            None => self.message.clone(),
        }
    }
}

impl From<DatabaseError> for SyncError {
    fn from(err: DatabaseError) -> Self {
        Self::storage(err.to_string())
    }
}

impl ErrorClassification for SyncError {
    fn is_retryable(&self) -> bool {
        self.recoverable
    }

    fn severity(&self) -> ErrorSeverity {
        if self.recoverable {
            ErrorSeverity::Warning
        } else {
            ErrorSeverity::Error
        }
    }
}

// ============================================================================
// State machine
// ============================================================================

/// A submission was asked to make a transition its current state forbids
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot {action} a submission that is {from}")]
pub struct InvalidStateTransition {
    pub from: StatusKind,
    pub action: Transition,
}
