use std::time::Duration;

use rand::Rng;

/// Exponential backoff with bounded additive jitter.
///
/// The delay before retry `attempt_index` (zero-based) is
/// `min(max, base * factor^attempt_index)` plus a random jitter drawn
/// uniformly from `[0, 10%)` of that exponential part. The result is always
/// at least `base` and strictly less than `max * 1.1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry, before jitter.
    pub base: Duration,
    /// Upper bound on the exponential part.
    pub max: Duration,
    /// Growth factor applied on each successive attempt.
    pub factor: f64,
}

/// Fraction of the exponential part used as the jitter ceiling.
const JITTER_RATIO: f64 = 0.1;

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, factor: f64) -> Self {
        Self { base, max, factor }
    }

    /// The un-jittered delay for `attempt_index`, clamped to `max`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use rentwise_executor::BackoffPolicy;
    ///
    /// let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(10), 2.0);
    /// assert_eq!(policy.exponential_part(0), Duration::from_secs(1));
    /// assert_eq!(policy.exponential_part(3), Duration::from_secs(8));
    /// assert_eq!(policy.exponential_part(4), Duration::from_secs(10));
    /// ```
    pub fn exponential_part(&self, attempt_index: u32) -> Duration {
        duration_from_nanos(self.exponential_nanos(attempt_index))
    }

    /// Compute the jittered delay for `attempt_index` using `rng`.
    ///
    /// Deterministic for a seeded generator.
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt_index: u32, rng: &mut R) -> Duration {
        let exponential = self.exponential_nanos(attempt_index);
        let ceiling = exponential * JITTER_RATIO;
        let jitter = if ceiling > 0.0 {
            rng.random_range(0.0..ceiling)
        } else {
            0.0
        };
        duration_from_nanos(exponential + jitter)
    }

    #[allow(clippy::cast_precision_loss)]
    fn exponential_nanos(&self, attempt_index: u32) -> f64 {
        let base = self.base.as_nanos() as f64;
        let max = self.max.as_nanos() as f64;
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        // Overflow to infinity is absorbed by the clamp.
        (base * self.factor.powi(exponent)).min(max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(10),
            factor: 2.0,
        }
    }
}

/// Free-function form of [`BackoffPolicy::delay_for`].
pub fn compute_delay<R: Rng + ?Sized>(
    attempt_index: u32,
    base: Duration,
    factor: f64,
    max: Duration,
    rng: &mut R,
) -> Duration {
    BackoffPolicy::new(base, max, factor).delay_for(attempt_index, rng)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn duration_from_nanos(nanos: f64) -> Duration {
    Duration::from_nanos(nanos.floor().max(0.0) as u64)
}
