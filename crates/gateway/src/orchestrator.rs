use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, instrument, warn};

use rentwise_core::{
    AnalysisKind, AnalysisOutcome, AnalysisPayload, DegradedModeSnapshot, ErrorKind,
    LocalMetrics, MetricsContext,
};
use rentwise_executor::{CircuitBreakerRegistry, RetryExecutor, RetryFailure, RetryOptions, RetryResult};
use rentwise_llm::{
    AnalysisEndpoint, AnalysisError, AnalysisRequest, MessageContext, classify_terminal_failure,
    degraded_message, is_validation_error, sanitize, sanitized_summary, user_message, validate,
};

use crate::degraded::{DegradedCheck, DegradedModeController};
use crate::metrics::OrchestratorMetrics;

/// Breaker key used for the remote analysis service unless configured.
pub const DEFAULT_SERVICE_KEY: &str = "ai-analysis";

/// Callback observing the progress of one request.
pub type ProgressHook = Arc<dyn Fn(&AnalysisProgress) + Send + Sync>;

/// Progress events emitted while a request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisProgress {
    /// A network attempt is starting.
    Attempting { attempt: u32, max_attempts: u32 },
    /// An attempt failed and another one follows after `delay`.
    RetryScheduled {
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    /// The local narrative is being served; the network is skipped for
    /// `remaining`.
    LocalFallback { remaining: Duration },
}

/// Per-request options for [`AnalysisOrchestrator::request_analysis_with`].
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Forces the analysis kind instead of deriving it from the payload.
    pub kind: Option<AnalysisKind>,
    on_progress: Option<ProgressHook>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_kind(mut self, kind: AnalysisKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn with_progress(
        mut self,
        hook: impl Fn(&AnalysisProgress) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Arc::new(hook));
        self
    }

    fn emit(&self, event: &AnalysisProgress) {
        if let Some(hook) = &self.on_progress {
            hook(event);
        }
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("kind", &self.kind)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Tunables of the orchestrator itself.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Circuit breaker key of the remote analysis service.
    pub service_key: String,
    /// Deadline applied to each network attempt.
    pub request_timeout: Duration,
    pub retry: RetryOptions,
    /// Currency symbol used by the local narrative.
    pub currency: String,
}

impl OrchestratorConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.service_key.trim().is_empty() {
            return Err("service_key must not be empty".into());
        }
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be > 0".into());
        }
        self.retry.validate()
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            service_key: DEFAULT_SERVICE_KEY.to_owned(),
            request_timeout: Duration::from_secs(30),
            retry: RetryOptions::default(),
            currency: "€".to_owned(),
        }
    }
}

/// Cancellation tokens of the requests currently running.
type InFlight = Mutex<HashMap<u64, CancellationToken>>;

/// Removes a request's token from the in-flight set when the request ends,
/// including when its future is dropped.
struct InFlightGuard<'a> {
    in_flight: &'a InFlight,
    id: u64,
    token: CancellationToken,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Entry point for narrative analysis requests.
///
/// Wraps the remote endpoint in the retry executor and the service circuit
/// breaker, validates and sanitizes what comes back, and falls back to the
/// locally computed narrative once repeated failures put the system in
/// degraded mode. Every call returns an [`AnalysisOutcome`]; no error escapes.
pub struct AnalysisOrchestrator {
    endpoint: Arc<dyn AnalysisEndpoint>,
    local_metrics: Arc<dyn LocalMetrics>,
    executor: RetryExecutor,
    degraded: Arc<DegradedModeController>,
    config: OrchestratorConfig,
    /// `config.retry` with validation failures made permanent.
    retry: RetryOptions,
    metrics: Arc<OrchestratorMetrics>,
    in_flight: InFlight,
    next_request_id: AtomicU64,
}

impl AnalysisOrchestrator {
    pub(crate) fn new(
        endpoint: Arc<dyn AnalysisEndpoint>,
        local_metrics: Arc<dyn LocalMetrics>,
        executor: RetryExecutor,
        degraded: Arc<DegradedModeController>,
        config: OrchestratorConfig,
    ) -> Self {
        let condition = config.retry.retry_condition();
        let retry = config
            .retry
            .clone()
            .with_retry_condition(move |err| !is_validation_error(err) && condition(err));
        Self {
            endpoint,
            local_metrics,
            executor,
            degraded,
            config,
            retry,
            metrics: Arc::new(OrchestratorMetrics::default()),
            in_flight: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(0),
        }
    }

    /// Request a narrative for `payload`, deriving the analysis kind from it.
    pub async fn request_analysis(&self, payload: &AnalysisPayload) -> AnalysisOutcome {
        self.request_analysis_with(payload, &RequestOptions::default())
            .await
    }

    /// Request a narrative for `payload` with explicit options.
    #[instrument(
        name = "orchestrator.request_analysis",
        skip_all,
        fields(records = payload.len(), kind)
    )]
    pub async fn request_analysis_with(
        &self,
        payload: &AnalysisPayload,
        options: &RequestOptions,
    ) -> AnalysisOutcome {
        self.metrics.increment_requests();

        let Some(derived) = AnalysisKind::for_payload(payload) else {
            debug!("empty payload, nothing to analyze");
            self.metrics.increment_invalid_payloads();
            return AnalysisOutcome::failure(
                ErrorKind::InvalidPayload,
                user_message(ErrorKind::InvalidPayload, &self.message_context(Duration::ZERO)),
            );
        };
        let kind = options.kind.unwrap_or(derived);
        Span::current().record("kind", kind.as_str());

        if let DegradedCheck::Degraded { remaining } = self.degraded.check() {
            debug!(
                remaining_secs = remaining.as_secs(),
                "degraded mode active, skipping network"
            );
            return self.local_outcome(payload, kind, remaining, options);
        }

        let guard = self.register_request();
        let request = AnalysisRequest::new(kind, payload.clone());
        let retry = self.retry_options_for(options);
        let max_attempts = retry.max_attempts;
        let request_ref = &request;

        let result = self
            .executor
            .execute(
                |attempt| {
                    options.emit(&AnalysisProgress::Attempting {
                        attempt,
                        max_attempts,
                    });
                    self.attempt(request_ref)
                },
                &retry,
                Some(&self.config.service_key),
                &guard.token,
            )
            .await;
        drop(guard);

        self.finish(result, payload, kind, options)
    }

    /// Cancel every request currently in flight.
    ///
    /// Returns the number of requests signalled. Cancelled requests resolve
    /// to a `USER_CANCELLED` outcome without counting as a failure.
    pub fn cancel_in_flight(&self) -> usize {
        let in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for token in in_flight.values() {
            token.cancel();
        }
        if !in_flight.is_empty() {
            info!(requests = in_flight.len(), "cancelling in-flight analysis requests");
        }
        in_flight.len()
    }

    /// Read-only degraded-mode view for countdown display.
    pub fn status(&self) -> DegradedModeSnapshot {
        self.degraded.snapshot()
    }

    /// Clear degraded mode and the service breaker, then request again.
    pub async fn manual_retry(&self, payload: &AnalysisPayload) -> AnalysisOutcome {
        self.manual_retry_with(payload, &RequestOptions::default())
            .await
    }

    pub async fn manual_retry_with(
        &self,
        payload: &AnalysisPayload,
        options: &RequestOptions,
    ) -> AnalysisOutcome {
        info!(service = %self.config.service_key, "manual retry requested");
        self.degraded.force_reset();
        self.executor.breakers().reset(&self.config.service_key);
        self.request_analysis_with(payload, options).await
    }

    /// Accept a narrative typed in by the user.
    ///
    /// The text is sanitized before it is returned. Non-empty input resets
    /// degraded mode.
    pub fn submit_manual_narrative(&self, text: &str) -> AnalysisOutcome {
        let clean = sanitize(text);
        if clean.trim().is_empty() {
            return AnalysisOutcome::failure(
                ErrorKind::InvalidPayload,
                "Enter a summary before saving.",
            );
        }
        self.degraded.force_reset();
        self.metrics.increment_manual_narratives();
        AnalysisOutcome::manual(clean)
    }

    /// Breaker registry, for diagnostics.
    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        self.executor.breakers()
    }

    pub fn metrics(&self) -> &Arc<OrchestratorMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// One network attempt: send with a deadline, validate, extract the
    /// sanitized narrative.
    async fn attempt(&self, request: &AnalysisRequest) -> Result<String, AnalysisError> {
        let timeout = self.config.request_timeout;
        let raw = tokio::time::timeout(timeout, self.endpoint.submit(request))
            .await
            .map_err(|_| AnalysisError::Timeout(timeout))??;

        let analysis = validate(&raw, request.kind).inspect_err(|err| {
            warn!(
                reason = %err.reason,
                mismatches = ?err.mismatches,
                raw = %err.raw,
                "analysis response failed validation"
            );
        })?;
        Ok(sanitized_summary(&analysis, request.kind)?)
    }

    fn finish(
        &self,
        result: RetryResult<String, AnalysisError>,
        payload: &AnalysisPayload,
        kind: AnalysisKind,
        options: &RequestOptions,
    ) -> AnalysisOutcome {
        let attempts = result.attempts_made;
        match result.outcome {
            Ok(narrative) => {
                info!(attempts, "analysis completed");
                self.degraded.record_success();
                self.metrics.increment_remote_successes();
                AnalysisOutcome::remote(narrative)
            }
            Err(RetryFailure::Cancelled) => {
                info!(attempts, "analysis cancelled by user");
                self.metrics.increment_cancellations();
                AnalysisOutcome::failure(
                    ErrorKind::UserCancelled,
                    user_message(ErrorKind::UserCancelled, &self.message_context(Duration::ZERO)),
                )
            }
            Err(RetryFailure::CircuitOpen(err)) => {
                self.metrics.increment_circuit_open();
                let message =
                    user_message(ErrorKind::CircuitOpen, &self.message_context(err.remaining));
                self.terminal_failure(ErrorKind::CircuitOpen, message, payload, kind, options)
            }
            Err(RetryFailure::Operation(err)) => {
                let error_kind = if is_validation_error(&err) {
                    self.metrics.increment_validation_failures();
                    ErrorKind::ValidationError
                } else {
                    classify_terminal_failure(
                        &err.to_string(),
                        err.is_timeout(),
                        self.config.request_timeout,
                        self.retry.max_attempts,
                    )
                    .error_kind
                };
                warn!(attempts, error = %err, %error_kind, "analysis failed");
                let message = user_message(error_kind, &self.message_context(Duration::ZERO));
                self.terminal_failure(error_kind, message, payload, kind, options)
            }
        }
    }

    /// Count a terminal failure toward degraded mode. The failure that
    /// switches to degraded mode is answered with the local narrative.
    fn terminal_failure(
        &self,
        error_kind: ErrorKind,
        message: String,
        payload: &AnalysisPayload,
        kind: AnalysisKind,
        options: &RequestOptions,
    ) -> AnalysisOutcome {
        self.metrics.increment_failures();
        if self.degraded.record_failure() {
            return self.local_outcome(payload, kind, self.degraded.config().cooldown, options);
        }
        AnalysisOutcome::failure(error_kind, message)
    }

    fn local_outcome(
        &self,
        payload: &AnalysisPayload,
        kind: AnalysisKind,
        remaining: Duration,
        options: &RequestOptions,
    ) -> AnalysisOutcome {
        options.emit(&AnalysisProgress::LocalFallback { remaining });
        let ctx = MetricsContext::new(kind).with_currency(self.config.currency.as_str());
        let narrative =
            self.local_metrics
                .narrate(&payload.transactions, &payload.reservations, &ctx);
        self.metrics.increment_local_fallbacks();
        AnalysisOutcome::local_fallback(sanitize(&narrative), degraded_message(remaining))
    }

    fn retry_options_for(&self, options: &RequestOptions) -> RetryOptions {
        let Some(progress) = options.on_progress.clone() else {
            return self.retry.clone();
        };
        let configured = self.retry.on_retry();
        self.retry
            .clone()
            .with_on_retry(move |attempt, err, delay| {
                if let Some(hook) = &configured {
                    hook(attempt, err, delay);
                }
                progress(&AnalysisProgress::RetryScheduled {
                    attempt,
                    delay,
                    reason: err.to_string(),
                });
            })
    }

    fn register_request(&self) -> InFlightGuard<'_> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, token.clone());
        InFlightGuard {
            in_flight: &self.in_flight,
            id,
            token,
        }
    }

    fn message_context(&self, cooldown: Duration) -> MessageContext {
        MessageContext {
            timeout: self.config.request_timeout,
            max_attempts: self.retry.max_attempts,
            cooldown,
        }
    }
}

impl fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("degraded", &self.degraded)
            .finish_non_exhaustive()
    }
}
