use std::sync::Arc;
use std::time::Duration;

use rentwise_core::{KpiNarrator, LocalMetrics};
use rentwise_executor::{CircuitBreakerRegistry, RetryExecutor, RetryOptions};
use rentwise_llm::AnalysisEndpoint;

use crate::degraded::{DegradedModeConfig, DegradedModeController};
use crate::error::OrchestratorError;
use crate::orchestrator::{AnalysisOrchestrator, OrchestratorConfig};

/// Fluent builder for constructing an [`AnalysisOrchestrator`].
///
/// At minimum an [`AnalysisEndpoint`] must be supplied. Everything else has a
/// default: the [`KpiNarrator`] for local narratives, a fresh breaker
/// registry, and a degraded-mode controller with default thresholds.
pub struct OrchestratorBuilder {
    endpoint: Option<Arc<dyn AnalysisEndpoint>>,
    local_metrics: Option<Arc<dyn LocalMetrics>>,
    breakers: Option<Arc<CircuitBreakerRegistry>>,
    degraded: Option<Arc<DegradedModeController>>,
    degraded_config: DegradedModeConfig,
    config: OrchestratorConfig,
    jitter_seed: Option<u64>,
}

impl OrchestratorBuilder {
    /// Create a new builder with all optional fields set to their defaults.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            local_metrics: None,
            breakers: None,
            degraded: None,
            degraded_config: DegradedModeConfig::default(),
            config: OrchestratorConfig::default(),
            jitter_seed: None,
        }
    }

    /// Set the remote analysis endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: Arc<dyn AnalysisEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set the narrator used while degraded.
    #[must_use]
    pub fn local_metrics(mut self, local_metrics: Arc<dyn LocalMetrics>) -> Self {
        self.local_metrics = Some(local_metrics);
        self
    }

    /// Share an existing breaker registry.
    #[must_use]
    pub fn circuit_breakers(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = Some(registry);
        self
    }

    /// Share an existing degraded-mode controller. Takes precedence over
    /// [`degraded_mode_config`](Self::degraded_mode_config).
    #[must_use]
    pub fn degraded_mode(mut self, controller: Arc<DegradedModeController>) -> Self {
        self.degraded = Some(controller);
        self
    }

    #[must_use]
    pub fn degraded_mode_config(mut self, config: DegradedModeConfig) -> Self {
        self.degraded_config = config;
        self
    }

    /// Replace the whole orchestrator configuration.
    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn retry_options(mut self, retry: RetryOptions) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the deadline applied to each network attempt.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the circuit breaker key of the remote service.
    #[must_use]
    pub fn service_key(mut self, key: impl Into<String>) -> Self {
        self.config.service_key = key.into();
        self
    }

    #[must_use]
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.config.currency = currency.into();
        self
    }

    /// Seed the backoff jitter so delays are reproducible.
    #[must_use]
    pub fn jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = Some(seed);
        self
    }

    /// Consume the builder and produce an [`AnalysisOrchestrator`].
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Configuration`] if the endpoint is
    /// missing or any configuration value is out of range.
    pub fn build(self) -> Result<AnalysisOrchestrator, OrchestratorError> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| OrchestratorError::Configuration("endpoint is required".into()))?;

        self.config
            .validate()
            .map_err(OrchestratorError::Configuration)?;

        let breakers = self
            .breakers
            .unwrap_or_else(|| Arc::new(CircuitBreakerRegistry::default()));
        breakers
            .validate()
            .map_err(OrchestratorError::Configuration)?;

        let degraded = match self.degraded {
            Some(controller) => controller,
            None => {
                self.degraded_config
                    .validate()
                    .map_err(OrchestratorError::Configuration)?;
                Arc::new(DegradedModeController::new(self.degraded_config))
            }
        };

        let mut executor = RetryExecutor::new(breakers);
        if let Some(seed) = self.jitter_seed {
            executor = executor.with_seed(seed);
        }

        let local_metrics = self
            .local_metrics
            .unwrap_or_else(|| Arc::new(KpiNarrator));

        Ok(AnalysisOrchestrator::new(
            endpoint,
            local_metrics,
            executor,
            degraded,
            self.config,
        ))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
