//! Wall-clock abstraction.
//!
//! Every timestamp the sync engine records (creation time, attempt time,
//! `next_retry_at`) comes from a [`Clock`], so retry scheduling can be tested
//! deterministically with [`MockClock`].

pub mod clock;

pub use clock::{Clock, MockClock, SharedClock, SystemClock};
