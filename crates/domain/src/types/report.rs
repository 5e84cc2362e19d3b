//! Per-run sync outcome and queue statistics.

use serde::{Deserialize, Serialize};

/// Error recorded for one submission during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionErrorEntry {
    pub submission_id: String,
    pub error: String,
}

/// Outcome of one sync run. Built fresh per run and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub succeeded_ids: Vec<String>,
    pub failed_ids: Vec<String>,
    pub errors: Vec<SubmissionErrorEntry>,
    pub duration_ms: u64,
}

impl SyncReport {
    /// Report for a run that had nothing to do (or was skipped).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, submission_id: impl Into<String>) {
        self.attempted += 1;
        self.succeeded += 1;
        self.succeeded_ids.push(submission_id.into());
    }

    pub fn record_failure(&mut self, submission_id: impl Into<String>, error: impl Into<String>) {
        let submission_id = submission_id.into();
        self.attempted += 1;
        self.failed += 1;
        self.errors.push(SubmissionErrorEntry { submission_id: submission_id.clone(), error: error.into() });
        self.failed_ids.push(submission_id);
    }

    /// Fold another report (e.g. one batch) into this one. Durations add up.
    pub fn merge(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.succeeded_ids.extend(other.succeeded_ids);
        self.failed_ids.extend(other.failed_ids);
        self.errors.extend(other.errors);
        self.duration_ms += other.duration_ms;
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Per-status counts of the local queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub syncing: usize,
    /// Failed and waiting for a retry
    pub failed: usize,
    /// Failed permanently; needs user action
    pub terminal: usize,
    pub succeeded: usize,
    pub total: usize,
}

impl QueueStats {
    /// Items not yet accepted by the remote.
    pub const fn unsynced(&self) -> usize {
        self.total.saturating_sub(self.succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_keeps_counts_consistent() {
        let mut report = SyncReport::empty();
        report.record_success("a");
        report.record_failure("b", "HTTP 503: down");
        report.record_success("c");

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded_ids, vec!["a", "c"]);
        assert_eq!(report.failed_ids, vec!["b"]);
        assert_eq!(report.errors[0].error, "HTTP 503: down");
        assert!(!report.is_clean());
    }

    #[test]
    fn merge_accumulates_batches() {
        let mut total = SyncReport::empty();
        let mut batch = SyncReport { duration_ms: 40, ..SyncReport::empty() };
        batch.record_success("x");
        total.merge(batch.clone());
        total.merge(batch);

        assert_eq!(total.attempted, 2);
        assert_eq!(total.duration_ms, 80);
        assert!(total.is_clean());
    }

    #[test]
    fn unsynced_excludes_succeeded() {
        let stats = QueueStats { pending: 3, failed: 1, terminal: 1, succeeded: 5, total: 10, syncing: 0 };
        assert_eq!(stats.unsynced(), 5);
    }
}
