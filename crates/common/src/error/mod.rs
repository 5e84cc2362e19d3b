//! Error classification shared by every layer.
//!
//! Concrete error enums live next to the code that produces them (domain,
//! infra). This module only defines the vocabulary they use to tell the
//! retry machinery and the logs how serious they are.

use std::fmt;
use std::time::Duration;

/// Classification of errors for retry decisions and log levels.
///
/// Implemented by every error type that can reach
/// [`RetryStrategy::execute_with_retry`](crate::sync::retry::RetryStrategy).
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient: network failures, timeouts, rate
    /// limiting and server-side (5xx) failures.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Suggested delay before the next attempt, if the error carries one
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Error severity levels for logging decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flaky;

    impl ErrorClassification for Flaky {
        fn is_retryable(&self) -> bool {
            true
        }

        fn severity(&self) -> ErrorSeverity {
            ErrorSeverity::Warning
        }
    }

    struct Corrupt;

    impl ErrorClassification for Corrupt {
        fn is_retryable(&self) -> bool {
            false
        }

        fn severity(&self) -> ErrorSeverity {
            ErrorSeverity::Critical
        }
    }

    #[test]
    fn default_methods_derive_from_severity() {
        assert!(!Flaky.is_critical());
        assert!(Flaky.retry_after().is_none());
        assert!(Corrupt.is_critical());
    }

    #[test]
    fn severity_orders_and_displays() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
        assert_eq!(ErrorSeverity::Critical.to_string(), "CRITICAL");
    }
}
