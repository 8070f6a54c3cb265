//! # Exponential backoff for message redelivery.
//!
//! [`BackoffPolicy`] computes how long a failed message waits in the retry
//! queue before its next delivery attempt. The delay before attempt `k + 1`
//! (after `k` failed attempts) is `first × factor^(k-1)`, clamped to `max`,
//! then jitter is applied. The base is derived purely from the attempt count,
//! so jitter output never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use agentvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! // One failed attempt: wait `first` before attempt 2.
//! assert_eq!(backoff.after_attempts(1), Duration::from_millis(100));
//! // Three failed attempts: 100ms × 2^2.
//! assert_eq!(backoff.after_attempts(3), Duration::from_millis(400));
//! // Far out: capped at max.
//! assert_eq!(backoff.after_attempts(20), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor.
    pub factor: f64,
    /// Randomisation applied to the computed delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 100ms`, `factor = 2.0`, `max = 30s`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay for the given retry index (0-indexed).
    ///
    /// The base delay is `first × factor^retry`, clamped to [`BackoffPolicy::max`].
    pub fn next(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter == JitterPolicy::Decorrelated {
            return self
                .jitter
                .apply_decorrelated(self.first.min(self.max), base, self.max);
        }
        self.jitter.apply(base)
    }

    /// Un-jittered delay; non-finite or out-of-range values collapse to `max`.
    fn base_delay(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        match Duration::try_from_secs_f64(secs) {
            Ok(d) if d <= self.max => d,
            _ => self.max,
        }
    }

    /// Delay to wait after `attempts` failed deliveries.
    ///
    /// `attempts` is 1-based (the number of attempts already made); zero is
    /// treated as one.
    #[inline]
    pub fn after_attempts(&self, attempts: u32) -> Duration {
        self.next(attempts.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling(first_ms: u64, max: Duration, jitter: JitterPolicy) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max,
            factor: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_retry_schedule_doubles() {
        let policy = doubling(250, Duration::from_secs(30), JitterPolicy::None);

        assert_eq!(policy.after_attempts(1), Duration::from_millis(250));
        assert_eq!(policy.after_attempts(2), Duration::from_millis(500));
        assert_eq!(policy.after_attempts(3), Duration::from_millis(1000));
        assert_eq!(policy.after_attempts(4), Duration::from_millis(2000));
    }

    #[test]
    fn test_zero_attempts_behaves_like_one() {
        let policy = doubling(250, Duration::from_secs(30), JitterPolicy::None);
        assert_eq!(policy.after_attempts(0), policy.after_attempts(1));
    }

    #[test]
    fn test_capped_at_max() {
        let policy = doubling(100, Duration::from_secs(1), JitterPolicy::None);
        assert_eq!(policy.next(10), Duration::from_secs(1));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_first_exceeds_max() {
        let policy = doubling(10_000, Duration::from_secs(5), JitterPolicy::None);
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_full_jitter_stays_under_base() {
        let policy = doubling(100, Duration::from_secs(30), JitterPolicy::Full);
        for retry in 0..8 {
            let base = Duration::from_millis(100 * (1 << retry));
            assert!(policy.next(retry) <= base, "retry {retry} exceeded base");
        }
    }

    #[test]
    fn test_equal_jitter_keeps_half() {
        let policy = doubling(1000, Duration::from_secs(30), JitterPolicy::Equal);
        for _ in 0..50 {
            let delay = policy.next(0);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_decorrelated_respects_floor_and_cap() {
        let policy = doubling(100, Duration::from_secs(2), JitterPolicy::Decorrelated);
        for _ in 0..100 {
            let delay = policy.next(6);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_secs(2));
        }
    }
}
