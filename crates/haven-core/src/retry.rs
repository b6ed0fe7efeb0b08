//! Shared exponential-backoff policy used by every component that retries a
//! transient failure against an external boundary: the Channel Manager's
//! outbound dispatcher, the Agent Loop's tool execution, and (conceptually)
//! the Provider Router's fallback walk. One helper instead of three copies
//! of the same doubling-with-a-cap arithmetic.

use std::time::Duration;

/// `base`, doubled on every attempt, capped at `max`, tried at most
/// `max_attempts` times (including the first attempt).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self { base, max, max_attempts }
    }

    /// Single-retry tool policy: one retry after a short fixed delay.
    pub const fn single_retry(delay: Duration) -> Self {
        Self::new(delay, delay, 2)
    }

    /// Delay to sleep before attempt number `attempt` (0-indexed; the first
    /// retry after an initial failure is `attempt == 0`).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy::new(Duration::from_secs(5), Duration::from_secs(60), 10);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(60));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(1), 3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn single_retry_allows_exactly_one_retry() {
        let policy = RetryPolicy::single_retry(Duration::from_millis(250));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }
}
