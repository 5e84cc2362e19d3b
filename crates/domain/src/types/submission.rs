//! The queued submission and its sync state machine.
//!
//! ```text
//! Pending ──mark_as_syncing──▶ Syncing ──mark_as_success──▶ Success
//!    ▲                            │
//!    │                      mark_as_failed
//!    │                            ▼
//!    └──reschedule / reset──── Failed { terminal }
//!         (mark_as_syncing directly once next_retry_at has passed)
//! ```
//!
//! Every transition is pure: it borrows the current value and returns the
//! next one, leaving persistence to the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use fieldsync_common::sync::retry::RetryStrategy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{InvalidStateTransition, SyncError};

/// Kind of scouting record being submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionType {
    MatchScouting,
    PitScouting,
    SuperScouting,
}

crate::impl_domain_status_conversions!(SubmissionType {
    MatchScouting => "match-scouting",
    PitScouting => "pit-scouting",
    SuperScouting => "super-scouting",
});

/// Upload priority; only affects ordering inside a sync run
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

crate::impl_domain_status_conversions!(Priority {
    Low => "low",
    Normal => "normal",
    High => "high",
    Critical => "critical",
});

impl Priority {
    /// Numeric rank stored alongside the submission (higher syncs first).
    pub const fn rank(self) -> i64 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

/// Where a submission is in its sync lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Syncing {
        attempt: u32,
    },
    Success {
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        attempt: u32,
        next_retry_at: Option<DateTime<Utc>>,
        terminal: bool,
    },
}

impl SyncStatus {
    pub const fn kind(&self) -> StatusKind {
        match self {
            Self::Pending => StatusKind::Pending,
            Self::Syncing { .. } => StatusKind::Syncing,
            Self::Success { .. } => StatusKind::Success,
            Self::Failed { .. } => StatusKind::Failed,
        }
    }
}

/// Fieldless view of [`SyncStatus`], used for storage, filtering and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Pending,
    Syncing,
    Success,
    Failed,
}

crate::impl_domain_status_conversions!(StatusKind {
    Pending => "pending",
    Syncing => "syncing",
    Success => "success",
    Failed => "failed",
});

/// State machine operations, named in [`InvalidStateTransition`] errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    MarkSyncing,
    MarkSuccess,
    MarkFailed,
    Reschedule,
    Reset,
    Abandon,
    Acknowledge,
}

crate::impl_domain_status_conversions!(Transition {
    MarkSyncing => "mark_syncing",
    MarkSuccess => "mark_success",
    MarkFailed => "mark_failed",
    Reschedule => "reschedule",
    Reset => "reset",
    Abandon => "abandon",
    Acknowledge => "acknowledge",
});

/// Caller-supplied fields for a new submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub submission_type: SubmissionType,
    pub team_number: u32,
    pub event_key: String,
    #[serde(default)]
    pub match_key: Option<String>,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub priority: Priority,
}

impl NewSubmission {
    pub fn new(
        submission_type: SubmissionType,
        team_number: u32,
        event_key: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            submission_type,
            team_number,
            event_key: event_key.into(),
            match_key: None,
            payload,
            headers: BTreeMap::new(),
            priority: Priority::Normal,
        }
    }

    #[must_use]
    pub fn with_match_key(mut self, match_key: impl Into<String>) -> Self {
        self.match_key = Some(match_key.into());
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A scouting record waiting to be (or already) uploaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub submission_type: SubmissionType,
    pub team_number: u32,
    pub event_key: String,
    pub match_key: Option<String>,
    /// Opaque body, forwarded to the remote as-is
    pub payload: serde_json::Value,
    pub headers: BTreeMap<String, String>,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub priority: Priority,
}

impl Submission {
    /// Create a pending submission with a fresh UUIDv7 identifier.
    pub fn create(new: NewSubmission, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            submission_type: new.submission_type,
            team_number: new.team_number,
            event_key: new.event_key,
            match_key: new.match_key,
            payload: new.payload,
            headers: new.headers,
            sync_status: SyncStatus::Pending,
            created_at: now,
            retry_count: 0,
            last_attempt_at: None,
            priority: new.priority,
        }
    }

    pub const fn status_kind(&self) -> StatusKind {
        self.sync_status.kind()
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self.sync_status, SyncStatus::Failed { terminal: true, .. })
    }

    /// Non-terminal failure whose backoff has elapsed.
    pub fn is_retry_due(&self, now: DateTime<Utc>) -> bool {
        match &self.sync_status {
            SyncStatus::Failed { terminal: false, next_retry_at, .. } => {
                next_retry_at.map_or(true, |at| at <= now)
            }
            _ => false,
        }
    }

    /// Whether [`mark_as_syncing`](Self::mark_as_syncing) would succeed at `now`.
    pub fn is_syncable(&self, now: DateTime<Utc>) -> bool {
        matches!(self.sync_status, SyncStatus::Pending) || self.is_retry_due(now)
    }

    fn reject(&self, action: Transition) -> InvalidStateTransition {
        InvalidStateTransition { from: self.status_kind(), action }
    }

    /// `Pending` (or a due non-terminal `Failed`) → `Syncing`.
    pub fn mark_as_syncing(&self, now: DateTime<Utc>) -> Result<Self, InvalidStateTransition> {
        if !self.is_syncable(now) {
            return Err(self.reject(Transition::MarkSyncing));
        }
        Ok(Self {
            sync_status: SyncStatus::Syncing { attempt: self.retry_count + 1 },
            last_attempt_at: Some(now),
            ..self.clone()
        })
    }

    /// `Syncing` → `Success`.
    pub fn mark_as_success(&self, now: DateTime<Utc>) -> Result<Self, InvalidStateTransition> {
        if !matches!(self.sync_status, SyncStatus::Syncing { .. }) {
            return Err(self.reject(Transition::MarkSuccess));
        }
        Ok(Self { sync_status: SyncStatus::Success { completed_at: now }, ..self.clone() })
    }

    /// `Syncing` → `Failed`.
    ///
    /// The failure is terminal when the error is not recoverable or the retry
    /// budget is spent; otherwise `next_retry_at` is scheduled from the
    /// strategy's backoff. `retry_count` grows by one either way.
    pub fn mark_as_failed(
        &self,
        error: &SyncError,
        retry: &RetryStrategy,
        now: DateTime<Utc>,
    ) -> Result<Self, InvalidStateTransition> {
        let SyncStatus::Syncing { attempt } = self.sync_status else {
            return Err(self.reject(Transition::MarkFailed));
        };

        let terminal = !error.recoverable || !retry.should_retry(self.retry_count);
        let next_retry_at = if terminal {
            None
        } else {
            let delay = Duration::from_std(retry.delay(attempt))
                .unwrap_or_else(|_| Duration::milliseconds(i64::MAX));
            Some(now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC))
        };

        Ok(Self {
            sync_status: SyncStatus::Failed {
                error: error.describe(),
                attempt,
                next_retry_at,
                terminal,
            },
            retry_count: self.retry_count + 1,
            ..self.clone()
        })
    }

    /// Non-terminal `Failed` → `Pending`, skipping the remaining backoff.
    pub fn reschedule(&self) -> Result<Self, InvalidStateTransition> {
        match self.sync_status {
            SyncStatus::Failed { terminal: false, .. } => {
                Ok(Self { sync_status: SyncStatus::Pending, ..self.clone() })
            }
            _ => Err(self.reject(Transition::Reschedule)),
        }
    }

    /// Any `Failed` (terminal included) → `Pending`. `retry_count` is kept.
    pub fn reset(&self) -> Result<Self, InvalidStateTransition> {
        match self.sync_status {
            SyncStatus::Failed { .. } => {
                Ok(Self { sync_status: SyncStatus::Pending, ..self.clone() })
            }
            _ => Err(self.reject(Transition::Reset)),
        }
    }

    /// `Syncing` → `Pending` for an attempt that never reported back (the
    /// process stopped mid-upload). `retry_count` is not charged.
    pub fn abandon(&self) -> Result<Self, InvalidStateTransition> {
        match self.sync_status {
            SyncStatus::Syncing { .. } => {
                Ok(Self { sync_status: SyncStatus::Pending, ..self.clone() })
            }
            _ => Err(self.reject(Transition::Abandon)),
        }
    }

    /// Last recorded error, if the submission is currently failed.
    pub fn last_error(&self) -> Option<&str> {
        match &self.sync_status {
            SyncStatus::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        match &self.sync_status {
            SyncStatus::Failed { next_retry_at, .. } => *next_retry_at,
            _ => None,
        }
    }
}
