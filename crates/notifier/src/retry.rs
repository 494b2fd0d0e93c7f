//! Retry policy: exponential backoff with a floor, a ceiling and a hard
//! attempt budget.
//!
//! `backoff(n) = clamp(min * 2^(n-1), min, max)` where `n` is the attempt
//! count after the current failure has been recorded.

use std::time::Duration;

/// Failed attempts after which an item is dead-lettered.
pub const MAX_ATTEMPTS: i32 = 10;

/// Lower bound for the retry delay.
pub const MIN_BACKOFF: Duration = Duration::from_secs(10);

/// Upper bound for the retry delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// What to do with an item whose delivery just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after `delay`. `attempt` is the new attempt count.
    Retry { attempt: i32, delay: Duration },
    /// Retry budget exhausted.
    Dead { attempt: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            min_backoff: MIN_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, given the attempt count after the failure.
    pub fn backoff(&self, attempts_after_failure: i32) -> Duration {
        let exponent = attempts_after_failure.saturating_sub(1).clamp(0, 31) as u32;
        let delay = self.min_backoff.saturating_mul(1u32 << exponent);
        delay.clamp(self.min_backoff, self.max_backoff)
    }

    /// Decide between retry and dead-letter for an item that had
    /// `prior_attempts` failures before this one.
    pub fn on_failure(&self, prior_attempts: i32) -> RetryDecision {
        let attempt = prior_attempts.max(0) + 1;
        if attempt >= self.max_attempts {
            RetryDecision::Dead { attempt }
        } else {
            RetryDecision::Retry {
                attempt,
                delay: self.backoff(attempt),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let policy = RetryPolicy::default();
        let secs: Vec<u64> = (1..=10).map(|n| policy.backoff(n).as_secs()).collect();
        assert_eq!(secs, vec![10, 20, 40, 80, 160, 320, 640, 1280, 2560, 3600]);
    }

    #[test]
    fn test_backoff_matches_closed_form_and_is_monotonic() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        for n in 1..=10 {
            let delay = policy.backoff(n);
            let expected = 3600u64.min(10 * 2u64.pow((n - 1) as u32));
            assert_eq!(delay.as_secs(), expected);
            assert!(delay >= MIN_BACKOFF);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn test_backoff_saturates_for_large_and_degenerate_counts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(64), MAX_BACKOFF);
        assert_eq!(policy.backoff(i32::MAX), MAX_BACKOFF);
        assert_eq!(policy.backoff(0), MIN_BACKOFF);
        assert_eq!(policy.backoff(-3), MIN_BACKOFF);
    }

    #[test]
    fn test_first_failure_retries_after_min_backoff() {
        let decision = RetryPolicy::default().on_failure(0);
        assert_eq!(
            decision,
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_secs(10)
            }
        );
    }

    #[test]
    fn test_ninth_prior_failure_goes_dead() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.on_failure(9), RetryDecision::Dead { attempt: 10 });
        assert!(matches!(
            policy.on_failure(8),
            RetryDecision::Retry { attempt: 9, .. }
        ));
    }
}
