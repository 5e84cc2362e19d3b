//! Domain events published by the sync engine.
//!
//! Events are ephemeral notifications. They are kept in a bounded in-memory
//! history for diagnostics but never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{QueueStats, SubmissionType};

/// What started a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// `sync_pending` called directly (sync-now button, app resume)
    Manual,
    /// Periodic auto-sync tick
    Scheduled,
    /// `force_sync`: backoff windows ignored
    Forced,
}

crate::impl_domain_status_conversions!(SyncTrigger {
    Manual => "manual",
    Scheduled => "scheduled",
    Forced => "forced",
});

/// Event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Queued {
        submission_id: String,
        submission_type: SubmissionType,
    },
    SyncStarted {
        trigger: SyncTrigger,
    },
    SyncCompleted {
        attempted: usize,
        succeeded: usize,
        failed: usize,
        duration_ms: u64,
    },
    SyncFailed {
        error: String,
    },
    SubmissionSuccess {
        submission_id: String,
        attempt: u32,
    },
    SubmissionFailed {
        submission_id: String,
        error: String,
        attempt: u32,
        terminal: bool,
    },
    SubmissionRetrying {
        submission_id: String,
        attempt: u32,
        next_retry_at: Option<DateTime<Utc>>,
    },
    SubmissionDeleted {
        submission_id: String,
    },
    QueueStateChanged {
        stats: QueueStats,
    },
}

/// Fieldless discriminant of [`EventKind`], used to scope subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Queued,
    SyncStarted,
    SyncCompleted,
    SyncFailed,
    SubmissionSuccess,
    SubmissionFailed,
    SubmissionRetrying,
    SubmissionDeleted,
    QueueStateChanged,
}

crate::impl_domain_status_conversions!(EventType {
    Queued => "queued",
    SyncStarted => "sync_started",
    SyncCompleted => "sync_completed",
    SyncFailed => "sync_failed",
    SubmissionSuccess => "submission_success",
    SubmissionFailed => "submission_failed",
    SubmissionRetrying => "submission_retrying",
    SubmissionDeleted => "submission_deleted",
    QueueStateChanged => "queue_state_changed",
});

impl EventKind {
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Queued { .. } => EventType::Queued,
            Self::SyncStarted { .. } => EventType::SyncStarted,
            Self::SyncCompleted { .. } => EventType::SyncCompleted,
            Self::SyncFailed { .. } => EventType::SyncFailed,
            Self::SubmissionSuccess { .. } => EventType::SubmissionSuccess,
            Self::SubmissionFailed { .. } => EventType::SubmissionFailed,
            Self::SubmissionRetrying { .. } => EventType::SubmissionRetrying,
            Self::SubmissionDeleted { .. } => EventType::SubmissionDeleted,
            Self::QueueStateChanged { .. } => EventType::QueueStateChanged,
        }
    }

    /// Submission the event is about, for per-item events.
    pub fn submission_id(&self) -> Option<&str> {
        match self {
            Self::Queued { submission_id, .. }
            | Self::SubmissionSuccess { submission_id, .. }
            | Self::SubmissionFailed { submission_id, .. }
            | Self::SubmissionRetrying { submission_id, .. }
            | Self::SubmissionDeleted { submission_id } => Some(submission_id),
            _ => None,
        }
    }
}

/// A published event, stamped by the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl DomainEvent {
    pub fn new(kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self { event_id: Uuid::now_v7(), timestamp, kind }
    }

    pub const fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}
