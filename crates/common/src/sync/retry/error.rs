// Error types for retry module
use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity};

/// Errors raised while building a retry policy
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryError {
    #[error("invalid retry configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl RetryError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig { field, reason: reason.into() }
    }
}

impl ErrorClassification for RetryError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Error
    }
}

/// Result type for retry operations
pub type RetryResult<T> = Result<T, RetryError>;
