//! Query filter for listing and counting submissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Priority, StatusKind, Submission, SubmissionType};

/// Exact-match filter; unset fields match everything.
///
/// The creation-time range is half-open: `[created_after, created_before)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionFilter {
    pub submission_type: Option<SubmissionType>,
    pub team_number: Option<u32>,
    pub event_key: Option<String>,
    pub match_key: Option<String>,
    pub status: Option<StatusKind>,
    /// Only meaningful with `status = Failed`
    pub terminal: Option<bool>,
    pub priority: Option<Priority>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl SubmissionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: StatusKind) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    /// Failed submissions that will not be retried automatically.
    pub fn terminal_failures() -> Self {
        Self { status: Some(StatusKind::Failed), terminal: Some(true), ..Self::default() }
    }

    /// Failed submissions still inside their retry budget.
    pub fn retryable_failures() -> Self {
        Self { status: Some(StatusKind::Failed), terminal: Some(false), ..Self::default() }
    }

    #[must_use]
    pub fn submission_type(mut self, submission_type: SubmissionType) -> Self {
        self.submission_type = Some(submission_type);
        self
    }

    #[must_use]
    pub fn team(mut self, team_number: u32) -> Self {
        self.team_number = Some(team_number);
        self
    }

    #[must_use]
    pub fn event(mut self, event_key: impl Into<String>) -> Self {
        self.event_key = Some(event_key.into());
        self
    }

    #[must_use]
    pub fn created_between(mut self, after: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        self.created_after = Some(after);
        self.created_before = Some(before);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-memory evaluation; stores translate the same rules into queries.
    /// `limit` is not considered here.
    pub fn matches(&self, submission: &Submission) -> bool {
        self.submission_type.map_or(true, |t| submission.submission_type == t)
            && self.team_number.map_or(true, |t| submission.team_number == t)
            && self.event_key.as_ref().map_or(true, |e| &submission.event_key == e)
            && self.match_key.as_ref().map_or(true, |m| submission.match_key.as_ref() == Some(m))
            && self.status.map_or(true, |s| submission.status_kind() == s)
            && self.terminal.map_or(true, |t| submission.is_terminal() == t)
            && self.priority.map_or(true, |p| submission.priority == p)
            && self.created_after.map_or(true, |after| submission.created_at >= after)
            && self.created_before.map_or(true, |before| submission.created_at < before)
    }
}
