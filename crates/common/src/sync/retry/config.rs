// Serializable retry configuration
use serde::{Deserialize, Serialize};

use crate::sync::retry::constants::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY_MS, DEFAULT_JITTER_MS, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MAX_RETRIES, MAX_MAX_RETRIES,
};
use crate::sync::retry::error::{RetryError, RetryResult};

/// Backoff parameters for failed uploads.
///
/// `max_retries` counts retries after the first attempt, so an operation is
/// attempted at most `max_retries + 1` times. A `jitter_ms` of zero disables
/// jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter_ms: DEFAULT_JITTER_MS,
        }
    }
}

impl RetryConfig {
    /// Same policy without jitter; delays become deterministic.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter_ms = 0;
        self
    }

    /// Reject values that would make the backoff curve meaningless.
    pub fn validate(&self) -> RetryResult<()> {
        if self.max_retries > MAX_MAX_RETRIES {
            return Err(RetryError::invalid(
                "max_retries",
                format!("must be at most {MAX_MAX_RETRIES}, got {}", self.max_retries),
            ));
        }
        if self.base_delay_ms == 0 {
            return Err(RetryError::invalid("base_delay_ms", "must be greater than zero"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(RetryError::invalid(
                "max_delay_ms",
                format!("must be >= base_delay_ms ({})", self.base_delay_ms),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(RetryError::invalid(
                "backoff_multiplier",
                format!("must be a finite value >= 1.0, got {}", self.backoff_multiplier),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay_ms, 1_000);
        assert_eq!(config.max_delay_ms, 60_000);
        assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.jitter_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let config = RetryConfig { base_delay_ms: 5_000, max_delay_ms: 1_000, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_delay_ms"));
    }

    #[test]
    fn validate_rejects_shrinking_multiplier() {
        let config = RetryConfig { backoff_multiplier: 0.5, ..Default::default() };
        assert!(config.validate().is_err());

        let config = RetryConfig { backoff_multiplier: f64::NAN, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: RetryConfig = serde_json::from_str(r#"{"max_retries": 2}"#).unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.jitter_ms, 500);
    }
}
