use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::circuit_breaker::{CallPermit, CircuitBreakerRegistry};
use crate::config::RetryOptions;
use crate::error::{CircuitOpenError, RetryFailure, RetryResult};

/// Runs an async operation with jittered exponential backoff, an optional
/// per-service circuit breaker, and cooperative cancellation.
///
/// Attempts are strictly sequential. The executor is `Send + Sync` and may be
/// shared across tasks; calls with distinct breaker keys do not interact.
pub struct RetryExecutor {
    breakers: Arc<CircuitBreakerRegistry>,
    rng: Mutex<StdRng>,
}

impl RetryExecutor {
    /// Create an executor backed by the given breaker registry.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use rentwise_executor::{CircuitBreakerRegistry, RetryExecutor};
    ///
    /// let executor = RetryExecutor::new(Arc::new(CircuitBreakerRegistry::default()));
    /// assert!(executor.breakers().is_empty());
    /// ```
    pub fn new(breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            breakers,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Seed the jitter source so backoff delays are reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Execute `operation` until it succeeds, fails permanently, exhausts
    /// `options.max_attempts`, is rejected by the breaker for `breaker_key`,
    /// or `cancel` fires.
    ///
    /// `operation` receives the one-based attempt number. Both the in-flight
    /// attempt and the backoff sleep are raced against `cancel`; a cancelled
    /// attempt is dropped and no further attempt is started.
    #[instrument(
        skip_all,
        fields(breaker = breaker_key.unwrap_or("-"), max_attempts = options.max_attempts, attempt)
    )]
    pub async fn execute<T, E, F, Fut>(
        &self,
        mut operation: F,
        options: &RetryOptions,
        breaker_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        let breaker = breaker_key.map(|key| self.breakers.get_or_create(key));
        let max_attempts = options.max_attempts.max(1);
        let backoff = options.backoff();

        let mut attempt = 0;
        let mut cumulative_delay = Duration::ZERO;
        let finish = |outcome, attempts_made, cumulative_delay| RetryResult {
            outcome,
            attempts_made,
            cumulative_delay,
        };

        loop {
            if cancel.is_cancelled() {
                debug!(attempts_made = attempt, "cancelled before attempt");
                return finish(Err(RetryFailure::Cancelled), attempt, cumulative_delay);
            }

            if let Some(breaker) = &breaker
                && let CallPermit::Reject { remaining } = breaker.before_call()
            {
                debug!(
                    service = breaker.key(),
                    remaining_ms = %remaining.as_millis(),
                    "circuit open, not attempting"
                );
                let err = CircuitOpenError {
                    key: breaker.key().to_owned(),
                    remaining,
                };
                return finish(Err(err.into()), attempt, cumulative_delay);
            }

            attempt += 1;
            tracing::Span::current().record("attempt", attempt);
            debug!(attempt, max_attempts, "starting attempt");

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = operation(attempt) => Some(result),
            };

            let Some(result) = result else {
                if let Some(breaker) = &breaker {
                    breaker.release_probe();
                }
                debug!(attempt, "attempt cancelled in flight");
                return finish(Err(RetryFailure::Cancelled), attempt, cumulative_delay);
            };

            let err = match result {
                Ok(value) => {
                    if let Some(breaker) = &breaker {
                        breaker.on_success();
                    }
                    debug!(attempt, "attempt succeeded");
                    return finish(Ok(value), attempt, cumulative_delay);
                }
                Err(err) => err,
            };

            if let Some(breaker) = &breaker {
                breaker.on_failure();
            }

            let retryable = options.should_retry(&err);
            if !retryable || attempt >= max_attempts {
                warn!(attempt, error = %err, retryable, "operation failed");
                return finish(
                    Err(RetryFailure::Operation(err)),
                    attempt,
                    cumulative_delay,
                );
            }

            let delay = self.next_delay(&backoff, attempt - 1);
            warn!(
                attempt,
                error = %err,
                delay_ms = %delay.as_millis(),
                "retryable failure, will retry"
            );
            options.notify_retry(attempt, &err, delay);

            let cancelled = tokio::select! {
                biased;
                () = cancel.cancelled() => true,
                () = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                debug!(attempt, "cancelled during backoff");
                return finish(Err(RetryFailure::Cancelled), attempt, cumulative_delay);
            }
            cumulative_delay += delay;
        }
    }

    fn next_delay(&self, backoff: &crate::retry::BackoffPolicy, attempt_index: u32) -> Duration {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        backoff.delay_for(attempt_index, &mut *rng)
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("breakers", &self.breakers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct TestError(&'static str);

    fn fast_options() -> RetryOptions {
        RetryOptions::default()
            .with_base_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(100))
    }

    fn executor() -> RetryExecutor {
        RetryExecutor::new(Arc::new(CircuitBreakerRegistry::default())).with_seed(1)
    }

    // -- Basic retry loop -----------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt() {
        let exec = executor();
        let result = exec
            .execute(
                |_| async { Ok::<_, TestError>(7) },
                &fast_options(),
                None,
                &CancellationToken::new(),
            )
            .await;
        assert!(result.succeeded());
        assert_eq!(result.attempts_made, 1);
        assert_eq!(result.cumulative_delay, Duration::ZERO);
        assert_eq!(result.into_result().unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let exec = executor();
        let calls = AtomicU32::new(0);
        let result = exec
            .execute(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err(TestError("network error"))
                        } else {
                            Ok("done")
                        }
                    }
                },
                &fast_options(),
                None,
                &CancellationToken::new(),
            )
            .await;
        assert!(result.succeeded());
        assert_eq!(result.attempts_made, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two sleeps, each at least the exponential part.
        assert!(result.cumulative_delay >= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempt_budget() {
        let exec = executor();
        let calls = AtomicU32::new(0);
        let result = exec
            .execute(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(TestError("network error")) }
                },
                &fast_options(),
                None,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.attempts_made, 3);
        let failure = result.into_result().unwrap_err();
        assert_eq!(failure.operation().unwrap().0, "network error");
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_condition_makes_one_attempt() {
        let exec = executor();
        let calls = AtomicU32::new(0);
        let options = fast_options()
            .with_max_attempts(5)
            .with_retry_condition(|_| false);
        let result = exec
            .execute(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(TestError("network error")) }
                },
                &options,
                None,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.attempts_made, 1);
        assert!(!result.succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_stops_default_condition() {
        let exec = executor();
        let result = exec
            .execute(
                |_| async { Err::<(), _>(TestError("invalid api key")) },
                &fast_options(),
                None,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.attempts_made, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn on_retry_hook_sees_each_retry() {
        let exec = executor();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = fast_options()
            .with_max_attempts(4)
            .with_on_retry(move |attempt, err, delay| {
                sink.lock().unwrap().push((attempt, err.to_string(), delay));
            });
        let result = exec
            .execute(
                |_| async { Err::<(), _>(TestError("timeout")) },
                &options,
                None,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.attempts_made, 4);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen.iter().map(|(a, _, _)| *a).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(seen.iter().all(|(_, msg, _)| msg == "timeout"));
        let total: Duration = seen.iter().map(|(_, _, d)| *d).sum();
        assert_eq!(total, result.cumulative_delay);
    }

    #[tokio::test(start_paused = true)]
    async fn same_seed_same_delays() {
        let run = || async {
            let exec = executor();
            exec.execute(
                |_| async { Err::<(), _>(TestError("network error")) },
                &fast_options(),
                None,
                &CancellationToken::new(),
            )
            .await
            .cumulative_delay
        };
        assert_eq!(run().await, run().await);
    }

    // -- Circuit breaker ------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn open_breaker_stops_loop_without_calling() {
        let registry = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(60),
        }));
        let exec = RetryExecutor::new(Arc::clone(&registry)).with_seed(1);
        let calls = AtomicU32::new(0);
        let options = fast_options().with_max_attempts(5);

        let result = exec
            .execute(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(TestError("network error")) }
                },
                &options,
                Some("analysis"),
                &CancellationToken::new(),
            )
            .await;

        // The second failure opens the breaker; the third attempt is rejected.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.attempts_made, 2);
        assert!(result.into_result().unwrap_err().is_circuit_open());
        assert_eq!(registry.state("analysis"), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_breaker_counter() {
        let registry = Arc::new(CircuitBreakerRegistry::default());
        let exec = RetryExecutor::new(Arc::clone(&registry)).with_seed(1);
        let result = exec
            .execute(
                |attempt| async move {
                    if attempt == 1 {
                        Err(TestError("503"))
                    } else {
                        Ok(())
                    }
                },
                &fast_options(),
                Some("analysis"),
                &CancellationToken::new(),
            )
            .await;
        assert!(result.succeeded());
        assert_eq!(registry.get("analysis").unwrap().consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_do_not_interact() {
        let registry = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        }));
        let exec = RetryExecutor::new(Arc::clone(&registry)).with_seed(1);
        let options = fast_options().with_max_attempts(1);
        let token = CancellationToken::new();

        let _ = exec
            .execute(
                |_| async { Err::<(), _>(TestError("network error")) },
                &options,
                Some("a"),
                &token,
            )
            .await;
        let ok = exec
            .execute(|_| async { Ok::<_, TestError>(()) }, &options, Some("b"), &token)
            .await;
        assert!(ok.succeeded());
        assert_eq!(registry.state("a"), CircuitState::Open);
        assert_eq!(registry.state("b"), CircuitState::Closed);
    }

    // -- Cancellation ---------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_makes_no_attempt() {
        let exec = executor();
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicU32::new(0);
        let result = exec
            .execute(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, TestError>(()) }
                },
                &fast_options(),
                None,
                &token,
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.attempts_made, 0);
        assert!(result.into_result().unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_attempt_drops_it() {
        let exec = executor();
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = exec
            .execute(
                |_| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, TestError>(())
                },
                &fast_options(),
                None,
                &token,
            )
            .await;
        assert_eq!(result.attempts_made, 1);
        assert!(result.into_result().unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_starts_no_new_attempt() {
        let exec = executor();
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let options = fast_options()
            .with_base_delay(Duration::from_secs(5))
            .with_max_delay(Duration::from_secs(10));

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = exec
            .execute(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(TestError("network error")) }
                },
                &options,
                None,
                &token,
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.cumulative_delay, Duration::ZERO);
        assert!(result.into_result().unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_trial_releases_half_open_slot() {
        let registry = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(10),
        }));
        registry.on_failure("svc");
        tokio::time::advance(Duration::from_secs(10)).await;

        let exec = RetryExecutor::new(Arc::clone(&registry)).with_seed(1);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        });
        let result = exec
            .execute(
                |_| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, TestError>(())
                },
                &fast_options(),
                Some("svc"),
                &token,
            )
            .await;
        assert!(result.into_result().unwrap_err().is_cancelled());
        assert_eq!(registry.state("svc"), CircuitState::HalfOpen);
        assert!(registry.before_call("svc").is_allowed());
    }
}
