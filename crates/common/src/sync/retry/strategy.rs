// Retry strategy with exponential backoff and jitter
use std::time::Duration;

use rand::Rng;

use crate::sync::retry::config::RetryConfig;
use crate::sync::retry::constants::MAX_BACKOFF_EXPONENT;
use crate::sync::retry::error::RetryResult;

/// Retry strategy with configurable exponential backoff and jitter.
///
/// Immutable once built; one instance is shared (behind an `Arc`) by every
/// upload a coordinator performs.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryStrategy {
    config: RetryConfig,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self { config: RetryConfig::default() }
    }
}

impl RetryStrategy {
    /// Build a strategy from a validated configuration.
    pub fn new(config: RetryConfig) -> RetryResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Copy of this strategy with a different retry budget, same backoff curve.
    #[must_use]
    pub fn with_max_retries(&self, max_retries: u32) -> Self {
        Self { config: RetryConfig { max_retries, ..self.config.clone() } }
    }

    /// Copy of this strategy without jitter.
    #[must_use]
    pub fn without_jitter(&self) -> Self {
        Self { config: self.config.clone().without_jitter() }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Upper bound on any delay this strategy can return.
    pub fn max_total_delay(&self) -> Duration {
        Duration::from_millis(self.config.max_delay_ms.saturating_add(self.config.jitter_ms))
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    ///
    /// `min(base * multiplier^(attempt - 1), max) + uniform(0, jitter)`.
    /// Attempt `0` is treated as `1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        if self.config.jitter_ms == 0 {
            return backoff;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.config.jitter_ms);
        backoff + Duration::from_millis(jitter)
    }

    /// Exponential part of [`delay`](Self::delay), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let max_millis = self.config.max_delay_ms as f64;
        let raw = self.config.base_delay_ms as f64
            * self.config.backoff_multiplier.powi(exponent as i32);
        let capped = if raw.is_finite() { raw.min(max_millis) } else { max_millis };

        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `retries_made` retries.
    pub fn should_retry(&self, retries_made: u32) -> bool {
        retries_made < self.config.max_retries
    }
}

#[cfg(feature = "runtime")]
mod execute {
    use std::fmt::Display;
    use std::future::Future;
    use std::time::Duration;

    use tracing::{debug, warn};

    use super::RetryStrategy;
    use crate::error::ErrorClassification;

    /// Details handed to the `on_retry` observer before each backoff wait.
    #[derive(Debug)]
    pub struct RetryAttempt<'a, E> {
        /// The attempt that just failed (1-based)
        pub attempt: u32,
        /// Total attempts allowed (`max_retries + 1`)
        pub max_attempts: u32,
        /// How long the strategy will sleep before the next attempt
        pub delay: Duration,
        /// The failure that triggered the retry
        pub error: &'a E,
    }

    impl RetryStrategy {
        /// Run `operation` until it succeeds, fails with a non-retryable error,
        /// or `max_retries + 1` attempts have been made.
        ///
        /// The operation receives the 1-based attempt number. `on_retry` is
        /// called before every sleep. On exhaustion the last error is returned.
        pub async fn execute_with_retry<F, Fut, T, E, R>(
            &self,
            mut operation: F,
            mut on_retry: R,
        ) -> Result<T, E>
        where
            F: FnMut(u32) -> Fut,
            Fut: Future<Output = Result<T, E>>,
            E: ErrorClassification + Display,
            R: FnMut(&RetryAttempt<'_, E>),
        {
            let max_attempts = self.max_retries().saturating_add(1);
            let mut attempt = 1;

            loop {
                let error = match operation(attempt).await {
                    Ok(value) => {
                        if attempt > 1 {
                            debug!(attempt, "Operation succeeded after retry");
                        }
                        return Ok(value);
                    }
                    Err(error) => error,
                };

                if !error.is_retryable() {
                    debug!(attempt, error = %error, "Non-retryable failure, giving up");
                    return Err(error);
                }
                if attempt >= max_attempts {
                    warn!(attempt, max_attempts, error = %error, "Retry attempts exhausted");
                    return Err(error);
                }

                let delay = error
                    .retry_after()
                    .map_or_else(|| self.delay(attempt), |hint| hint.min(self.max_total_delay()));
                warn!(
                    attempt,
                    max_attempts,
                    delay = ?delay,
                    error = %error,
                    "Attempt failed, backing off"
                );
                on_retry(&RetryAttempt { attempt, max_attempts, delay, error: &error });

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(feature = "runtime")]
pub use execute::RetryAttempt;

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(config: RetryConfig) -> RetryStrategy {
        RetryStrategy::new(config).unwrap()
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let s = strategy(RetryConfig {
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter_ms: 0,
            ..Default::default()
        });

        assert_eq!(s.delay(1), Duration::from_millis(100));
        assert_eq!(s.delay(2), Duration::from_millis(200));
        assert_eq!(s.delay(3), Duration::from_millis(400));
        assert_eq!(s.delay(4), Duration::from_millis(800));
        assert_eq!(s.delay(5), Duration::from_millis(1_000));
        assert_eq!(s.delay(40), Duration::from_millis(1_000));
    }

    #[test]
    fn attempt_zero_uses_base_delay() {
        let s = strategy(RetryConfig::default().without_jitter());
        assert_eq!(s.delay(0), Duration::from_millis(1_000));
    }

    #[test]
    fn delay_is_monotone_and_bounded_with_jitter() {
        let s = RetryStrategy::default();
        let bound = s.max_total_delay();
        assert_eq!(bound, Duration::from_millis(60_500));

        let mut previous = Duration::ZERO;
        for attempt in 1..=20 {
            let backoff = s.backoff(attempt);
            assert!(backoff >= previous, "backoff shrank at attempt {attempt}");
            previous = backoff;

            for _ in 0..20 {
                let delay = s.delay(attempt);
                assert!(delay >= backoff);
                assert!(delay <= backoff + Duration::from_millis(500));
                assert!(delay <= bound);
            }
        }
    }

    #[test]
    fn multiplier_is_respected() {
        let s = strategy(RetryConfig {
            base_delay_ms: 10,
            backoff_multiplier: 3.0,
            jitter_ms: 0,
            ..Default::default()
        });
        assert_eq!(s.delay(3), Duration::from_millis(90));
    }

    #[test]
    fn should_retry_counts_retries_already_made() {
        let s = RetryStrategy::default().with_max_retries(3);
        assert!(s.should_retry(0));
        assert!(s.should_retry(2));
        assert!(!s.should_retry(3));
        assert!(!s.should_retry(4));
    }

    #[test]
    fn with_max_retries_keeps_backoff_curve() {
        let base = strategy(RetryConfig { base_delay_ms: 250, ..Default::default() });
        let derived = base.with_max_retries(0);
        assert_eq!(derived.max_retries(), 0);
        assert_eq!(derived.config().base_delay_ms, 250);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = RetryStrategy::new(RetryConfig { base_delay_ms: 0, ..Default::default() });
        assert!(result.is_err());
    }
}
