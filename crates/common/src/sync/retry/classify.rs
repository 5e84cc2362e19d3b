//! Classification of remote outcomes into success, retryable and terminal.
//!
//! Transport-level failures (connection refused, DNS, timeouts) never reach
//! these helpers; callers treat them as retryable directly.

use crate::sync::retry::constants::TERMINAL_PHRASES;

/// How an HTTP status should be handled by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpOutcome {
    /// 2xx
    Success,
    /// 5xx, 429 and 408: try again later
    Retryable,
    /// Everything else: retrying cannot help
    Terminal,
}

/// Map an HTTP status code to an [`HttpOutcome`].
#[must_use]
pub fn classify_status(status: u16) -> HttpOutcome {
    match status {
        200..=299 => HttpOutcome::Success,
        s if is_retryable_status(s) => HttpOutcome::Retryable,
        _ => HttpOutcome::Terminal,
    }
}

/// `true` for statuses that signal a transient server-side condition.
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

/// `true` when an error message contains one of the permanent-failure phrases
/// (case-insensitive).
#[must_use]
pub fn is_terminal_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    TERMINAL_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}
