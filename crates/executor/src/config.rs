use std::error::Error;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

use crate::retry::BackoffPolicy;

/// Predicate deciding whether a failure is worth another attempt.
pub type RetryCondition = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// Hook invoked before each backoff sleep with the attempt that just failed,
/// its failure, and the delay about to be slept.
pub type RetryHook = Arc<dyn Fn(u32, &(dyn Error + 'static), Duration) + Send + Sync>;

/// Message fragments that mark a failure as transient.
const TRANSIENT_SIGNATURES: &[&str] = &[
    "network error",
    "failed to fetch",
    "fetch failed",
    "error sending request",
    "connection refused",
    "connection reset",
    "timed out",
    "timeout",
    "rate limit",
    "too many requests",
    "quota exceeded",
    "server error",
    "service unavailable",
    "bad gateway",
];

static STATUS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(429|5\d\d)\b").expect("status code regex is valid"));

/// Default transient-failure classifier.
///
/// Walks the error's source chain and matches each message, lowercased,
/// against a fixed set of transient signatures (network, fetch failure,
/// timeout, rate limiting, quota, 5xx-class). Anything else is treated as
/// permanent.
pub fn default_retry_condition(err: &(dyn Error + 'static)) -> bool {
    std::iter::successors(Some(err), |&e| e.source()).any(|e| {
        let message = e.to_string().to_lowercase();
        TRANSIENT_SIGNATURES.iter().any(|sig| message.contains(sig))
            || STATUS_CODE.is_match(&message)
    })
}

/// Per-call options for [`RetryExecutor`](crate::RetryExecutor).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rentwise_executor::RetryOptions;
///
/// let options = RetryOptions::default()
///     .with_max_attempts(5)
///     .with_base_delay(Duration::from_millis(200));
/// assert_eq!(options.max_attempts, 5);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct RetryOptions {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    retry_condition: RetryCondition,
    on_retry: Option<RetryHook>,
}

impl RetryOptions {
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    /// Replace the retry predicate.
    #[must_use]
    pub fn with_retry_condition(
        mut self,
        condition: impl Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retry_condition = Arc::new(condition);
        self
    }

    /// Install a hook observed before every backoff sleep.
    #[must_use]
    pub fn with_on_retry(
        mut self,
        hook: impl Fn(u32, &(dyn Error + 'static), Duration) + Send + Sync + 'static,
    ) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn should_retry(&self, err: &(dyn Error + 'static)) -> bool {
        (self.retry_condition)(err)
    }

    /// The installed retry predicate, for wrapping in a stricter one.
    pub fn retry_condition(&self) -> RetryCondition {
        Arc::clone(&self.retry_condition)
    }

    pub fn on_retry(&self) -> Option<RetryHook> {
        self.on_retry.clone()
    }

    pub(crate) fn notify_retry(&self, attempt: u32, err: &(dyn Error + 'static), delay: Duration) {
        if let Some(hook) = &self.on_retry {
            hook(attempt, err, delay);
        }
    }

    /// The backoff curve described by these options.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.base_delay, self.max_delay, self.backoff_factor)
    }

    /// Validate option values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts < 1 {
            return Err("max_attempts must be >= 1".into());
        }
        if self.base_delay.is_zero() {
            return Err("base_delay must be > 0".into());
        }
        if self.max_delay < self.base_delay {
            return Err("max_delay must be >= base_delay".into());
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 1.0 {
            return Err("backoff_factor must be a finite number > 1".into());
        }
        Ok(())
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            retry_condition: Arc::new(default_retry_condition),
            on_retry: None,
        }
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("on_retry", &self.on_retry.is_some())
            .finish_non_exhaustive()
    }
}
