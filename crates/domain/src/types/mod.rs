//! Domain types and models

pub mod events;
pub mod filter;
pub mod report;
pub mod submission;

pub use events::{DomainEvent, EventKind, EventType, SyncTrigger};
pub use filter::SubmissionFilter;
pub use report::{QueueStats, SubmissionErrorEntry, SyncReport};
pub use submission::{
    NewSubmission, Priority, StatusKind, Submission, SubmissionType, SyncStatus, Transition,
};
