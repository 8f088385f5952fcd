//! # Retry
//!
//! Exponential backoff with bounded jitter for scheduling job retries.
use std::time;

use rand::Rng;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RetryPolicyError {
    #[error("base interval must be positive")]
    NonPositiveBase,
    #[error("maximum interval must be >= base interval")]
    MaxBelowBase,
    #[error("jitter must be in [0, 1)")]
    JitterOutOfRange,
}

/// A source of uniformly-distributed `f64`s in `[0, 1)`. `ThreadRng`/`StdRng` implement it
/// directly; a worker constructs one RNG at startup and reuses it across attempts so delay
/// computation never blocks on a fresh entropy pull per retry.
pub trait JitterSource {
    fn next_unit(&mut self) -> f64;
}

impl<R: Rng + ?Sized> JitterSource for R {
    fn next_unit(&mut self) -> f64 {
        self.gen::<f64>()
    }
}

/// A retry policy to determine backoff and jitter for a job attempt.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    base: time::Duration,
    max: time::Duration,
    jitter: f64,
}

impl RetryPolicy {
    /// `base` is the delay before the first retry, `max` caps the un-jittered delay, and
    /// `jitter` is the fraction by which the computed delay may be scaled up or down
    /// (`[1-jitter, 1+jitter]`).
    pub fn new(
        base: time::Duration,
        max: time::Duration,
        jitter: f64,
    ) -> Result<Self, RetryPolicyError> {
        if base.is_zero() {
            return Err(RetryPolicyError::NonPositiveBase);
        }
        if max < base {
            return Err(RetryPolicyError::MaxBelowBase);
        }
        if !(0.0..1.0).contains(&jitter) {
            return Err(RetryPolicyError::JitterOutOfRange);
        }
        Ok(Self { base, max, jitter })
    }

    pub fn base(&self) -> time::Duration {
        self.base
    }

    pub fn max(&self) -> time::Duration {
        self.max
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// `delay = min(base * 2^(attempt-1), max)`, scaled by a jitter factor drawn uniformly from
    /// `[1-jitter, 1+jitter]` and clamped to at least 1ms. `attempt` is 1-indexed: the first
    /// retry after an initial failure is attempt 1.
    pub fn delay(&self, attempt: u32, rng: &mut dyn JitterSource) -> time::Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let doubled = self.base.checked_mul(1u32 << exponent.min(31));
        let candidate = doubled.unwrap_or(self.max).min(self.max);

        let factor = 1.0 - self.jitter + rng.next_unit() * (2.0 * self.jitter);
        let jittered_nanos = candidate.as_nanos() as f64 * factor;

        let min_nanos = time::Duration::from_millis(1).as_nanos() as f64;
        time::Duration::from_nanos(jittered_nanos.max(min_nanos) as u64)
    }

    /// The absolute millisecond timestamp at which a job retried at `attempt` becomes due,
    /// suitable as the score in a time-ordered retry set.
    pub fn due_score_millis(
        &self,
        attempt: u32,
        now: time::SystemTime,
        rng: &mut dyn JitterSource,
    ) -> f64 {
        let due = now + self.delay(attempt, rng);
        due.duration_since(time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedJitter(f64);

    impl JitterSource for FixedJitter {
        fn next_unit(&mut self) -> f64 {
            self.0
        }
    }

    #[test]
    fn rejects_non_positive_base() {
        assert_eq!(
            RetryPolicy::new(time::Duration::ZERO, time::Duration::from_secs(1), 0.1)
                .unwrap_err(),
            RetryPolicyError::NonPositiveBase
        );
    }

    #[test]
    fn rejects_max_below_base() {
        assert_eq!(
            RetryPolicy::new(time::Duration::from_secs(2), time::Duration::from_secs(1), 0.1)
                .unwrap_err(),
            RetryPolicyError::MaxBelowBase
        );
    }

    #[test]
    fn rejects_jitter_out_of_range() {
        assert_eq!(
            RetryPolicy::new(time::Duration::from_secs(1), time::Duration::from_secs(1), 1.0)
                .unwrap_err(),
            RetryPolicyError::JitterOutOfRange
        );
        assert_eq!(
            RetryPolicy::new(time::Duration::from_secs(1), time::Duration::from_secs(1), -0.1)
                .unwrap_err(),
            RetryPolicyError::JitterOutOfRange
        );
    }

    #[test]
    fn delay_doubles_until_capped() {
        let policy =
            RetryPolicy::new(time::Duration::from_secs(1), time::Duration::from_secs(10), 0.0)
                .unwrap();
        let mut rng = FixedJitter(0.5);
        assert_eq!(policy.delay(1, &mut rng), time::Duration::from_secs(1));
        assert_eq!(policy.delay(2, &mut rng), time::Duration::from_secs(2));
        assert_eq!(policy.delay(3, &mut rng), time::Duration::from_secs(4));
        assert_eq!(policy.delay(4, &mut rng), time::Duration::from_secs(8));
        assert_eq!(policy.delay(5, &mut rng), time::Duration::from_secs(10));
        assert_eq!(policy.delay(6, &mut rng), time::Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(
            time::Duration::from_secs(10),
            time::Duration::from_secs(100),
            0.2,
        )
        .unwrap();
        let mut low = FixedJitter(0.0);
        let mut high = FixedJitter(1.0);
        assert_eq!(policy.delay(1, &mut low), time::Duration::from_millis(8_000));
        assert_eq!(policy.delay(1, &mut high), time::Duration::from_millis(12_000));
    }

    #[test]
    fn delay_never_below_one_millisecond() {
        let policy =
            RetryPolicy::new(time::Duration::from_nanos(1), time::Duration::from_nanos(1), 0.0)
                .unwrap();
        let mut rng = FixedJitter(0.0);
        assert_eq!(policy.delay(1, &mut rng), time::Duration::from_millis(1));
    }

    #[test]
    fn due_score_reflects_delay() {
        let policy =
            RetryPolicy::new(time::Duration::from_secs(1), time::Duration::from_secs(1), 0.0)
                .unwrap();
        let mut rng = FixedJitter(0.0);
        let now = time::UNIX_EPOCH + time::Duration::from_secs(1_000);
        let score = policy.due_score_millis(1, now, &mut rng);
        assert_eq!(score, 1_001_000.0);
    }
}
