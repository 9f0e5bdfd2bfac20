use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use rentwise_core::CircuitBreakerStatus;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls flow through.
    Closed,
    /// The service is failing, calls are rejected immediately.
    Open,
    /// Cooldown elapsed, a single trial call tests the service.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for a per-service circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long to stay `Open` before admitting a trial call.
    pub reset_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Validate configuration values.
    ///
    /// `reset_timeout = 0` is allowed (useful for testing).
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold < 1 {
            return Err("failure_threshold must be >= 1".into());
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Answer of [`CircuitBreaker::before_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPermit {
    Allow,
    /// Rejected; `remaining` is the time until a trial call is admitted.
    Reject { remaining: Duration },
}

impl CallPermit {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

struct CircuitData {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Whether the single `HalfOpen` trial call is currently in flight.
    probe_in_flight: bool,
}

impl CircuitData {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Circuit breaker guarding one remote service.
///
/// Transitions:
/// - `Closed` -> `Open` when consecutive failures reach the threshold
/// - `Open` -> `HalfOpen` on the first call after the reset timeout elapses
/// - `HalfOpen` -> `Closed` when the trial call succeeds
/// - `HalfOpen` -> `Open` when the trial call fails, restarting the cooldown
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    data: RwLock<CircuitData>,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            key: key.into(),
            config,
            data: RwLock::new(CircuitData::new()),
        }
    }

    /// Decide whether a call may proceed.
    ///
    /// An `Open` breaker whose cooldown has elapsed moves to `HalfOpen` and
    /// admits exactly one trial; every other caller is rejected until that
    /// trial resolves through [`on_success`](Self::on_success),
    /// [`on_failure`](Self::on_failure) or
    /// [`release_probe`](Self::release_probe).
    pub fn before_call(&self) -> CallPermit {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match data.state {
            CircuitState::Closed => CallPermit::Allow,
            CircuitState::Open => {
                let remaining = self.remaining(&data);
                if remaining.is_zero() {
                    debug!(
                        service = %self.key,
                        "circuit breaker transitioning from open to half-open"
                    );
                    data.state = CircuitState::HalfOpen;
                    data.probe_in_flight = true;
                    CallPermit::Allow
                } else {
                    CallPermit::Reject { remaining }
                }
            }
            CircuitState::HalfOpen if data.probe_in_flight => CallPermit::Reject {
                remaining: Duration::ZERO,
            },
            CircuitState::HalfOpen => {
                data.probe_in_flight = true;
                CallPermit::Allow
            }
        }
    }

    /// Record a successful call.
    ///
    /// Returns `Some((from, to))` if a state transition occurred.
    pub fn on_success(&self) -> Option<(CircuitState, CircuitState)> {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match data.state {
            CircuitState::HalfOpen => {
                info!(service = %self.key, "circuit breaker closing after successful trial");
                data.state = CircuitState::Closed;
                data.consecutive_failures = 0;
                data.opened_at = None;
                data.probe_in_flight = false;
                Some((CircuitState::HalfOpen, CircuitState::Closed))
            }
            CircuitState::Closed => {
                data.consecutive_failures = 0;
                None
            }
            CircuitState::Open => None,
        }
    }

    /// Record a failed call.
    ///
    /// Returns `Some((from, to))` if a state transition occurred.
    pub fn on_failure(&self) -> Option<(CircuitState, CircuitState)> {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        data.consecutive_failures = data.consecutive_failures.saturating_add(1);
        match data.state {
            CircuitState::Closed => {
                if data.consecutive_failures >= self.config.failure_threshold {
                    info!(
                        service = %self.key,
                        failures = data.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "circuit breaker opening"
                    );
                    data.state = CircuitState::Open;
                    data.opened_at = Some(Instant::now());
                    Some((CircuitState::Closed, CircuitState::Open))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                info!(
                    service = %self.key,
                    "circuit breaker re-opening after failed trial"
                );
                data.state = CircuitState::Open;
                data.opened_at = Some(Instant::now());
                data.probe_in_flight = false;
                Some((CircuitState::HalfOpen, CircuitState::Open))
            }
            CircuitState::Open => None,
        }
    }

    /// Free the `HalfOpen` trial slot without resolving the state.
    ///
    /// Used when a trial call is abandoned, e.g. by cancellation.
    pub fn release_probe(&self) {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if data.state == CircuitState::HalfOpen {
            data.probe_in_flight = false;
        }
    }

    /// Get current state without triggering transitions.
    pub fn state(&self) -> CircuitState {
        self.data
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.data
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .consecutive_failures
    }

    /// Time until an `Open` breaker admits a trial call; `None` otherwise.
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        let data = self
            .data
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        (data.state == CircuitState::Open).then(|| self.remaining(&data))
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Service identifier this breaker guards.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reset the circuit breaker to `Closed` state.
    pub fn reset(&self) {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if data.state != CircuitState::Closed {
            info!(service = %self.key, from = %data.state, "circuit breaker reset");
        }
        *data = CircuitData::new();
    }

    /// Serializable snapshot for diagnostics.
    pub fn status(&self) -> CircuitBreakerStatus {
        let data = self
            .data
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let remaining = (data.state == CircuitState::Open).then(|| {
            let remaining = self.remaining(&data);
            remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
        });
        CircuitBreakerStatus {
            service: self.key.clone(),
            state: data.state.to_string(),
            consecutive_failures: data.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            reset_timeout_seconds: self.config.reset_timeout.as_secs(),
            remaining_cooldown_seconds: remaining,
        }
    }

    fn remaining(&self, data: &CircuitData) -> Duration {
        data.opened_at.map_or(Duration::ZERO, |opened_at| {
            self.config.reset_timeout.saturating_sub(opened_at.elapsed())
        })
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self
            .data
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f.debug_struct("CircuitBreaker")
            .field("key", &self.key)
            .field("config", &self.config)
            .field("state", &data.state)
            .field("consecutive_failures", &data.consecutive_failures)
            .finish_non_exhaustive()
    }
}

/// Process-wide registry of circuit breakers keyed by service identifier.
///
/// Breakers are created lazily on first use with the default configuration
/// unless a per-service override was registered.
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            overrides: HashMap::new(),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Use `config` instead of the default for breakers created for `key`.
    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(key.into(), config);
        self
    }

    /// Validate the default configuration and every override.
    pub fn validate(&self) -> Result<(), String> {
        self.default_config.validate()?;
        for (key, config) in &self.overrides {
            config
                .validate()
                .map_err(|e| format!("circuit breaker for '{key}': {e}"))?;
        }
        Ok(())
    }

    /// Return the breaker for `key`, creating it on first use.
    pub fn get_or_create(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.get(key) {
            return breaker;
        }
        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(breakers.entry(key.to_owned()).or_insert_with(|| {
            let config = self
                .overrides
                .get(key)
                .cloned()
                .unwrap_or_else(|| self.default_config.clone());
            Arc::new(CircuitBreaker::new(key, config))
        }))
    }

    /// Look up an existing breaker without creating one.
    pub fn get(&self, key: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn before_call(&self, key: &str) -> CallPermit {
        self.get_or_create(key).before_call()
    }

    pub fn on_success(&self, key: &str) -> Option<(CircuitState, CircuitState)> {
        self.get_or_create(key).on_success()
    }

    pub fn on_failure(&self, key: &str) -> Option<(CircuitState, CircuitState)> {
        self.get_or_create(key).on_failure()
    }

    pub fn release_probe(&self, key: &str) {
        if let Some(breaker) = self.get(key) {
            breaker.release_probe();
        }
    }

    /// Reset the breaker for `key`. Returns `false` if none exists yet.
    pub fn reset(&self, key: &str) -> bool {
        self.get(key).is_some_and(|breaker| {
            breaker.reset();
            true
        })
    }

    /// State of the breaker for `key`; unknown services report `Closed`.
    pub fn state(&self, key: &str) -> CircuitState {
        self.get(key).map_or(CircuitState::Closed, |b| b.state())
    }

    pub fn status(&self, key: &str) -> Option<CircuitBreakerStatus> {
        self.get(key).map(|breaker| breaker.status())
    }

    /// Sorted list of service identifiers with a live breaker.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .breakers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Snapshots of every live breaker, sorted by service identifier.
    pub fn statuses(&self) -> Vec<CircuitBreakerStatus> {
        self.keys()
            .iter()
            .filter_map(|key| self.get(key))
            .map(|breaker| breaker.status())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("default_config", &self.default_config)
            .field("services", &self.keys())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
        }
    }

    fn open_breaker(cb: &CircuitBreaker) {
        for _ in 0..cb.config().failure_threshold {
            cb.on_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    // -- CircuitState tests ---------------------------------------------------

    #[test]
    fn circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
    }

    // -- CircuitBreakerConfig tests -------------------------------------------

    #[test]
    fn default_config_values() {
        let cfg = CircuitBreakerConfig::default();
        assert_eq!(cfg.failure_threshold, 5);
        assert_eq!(cfg.reset_timeout, Duration::from_secs(60));
    }

    #[test]
    fn config_validation_rejects_zero_failure_threshold() {
        let config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_validation_allows_zero_reset_timeout() {
        let config = CircuitBreakerConfig {
            reset_timeout: Duration::ZERO,
            ..test_config()
        };
        assert!(config.validate().is_ok());
    }

    // -- Threshold ------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn opens_exactly_at_threshold() {
        let cb = CircuitBreaker::new("svc", test_config());

        cb.on_failure();
        cb.on_failure();
        assert_eq!(cb.before_call(), CallPermit::Allow);
        assert_eq!(cb.state(), CircuitState::Closed);

        let transition = cb.on_failure();
        assert_eq!(transition, Some((CircuitState::Closed, CircuitState::Open)));
        assert!(matches!(cb.before_call(), CallPermit::Reject { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn success_in_closed_resets_counter() {
        let cb = CircuitBreaker::new("svc", test_config());
        cb.on_failure();
        cb.on_failure();
        cb.on_success();
        assert_eq!(cb.consecutive_failures(), 0);
        cb.on_failure();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_reports_remaining_cooldown() {
        let cb = CircuitBreaker::new("svc", test_config());
        open_breaker(&cb);
        tokio::time::advance(Duration::from_secs(20)).await;
        match cb.before_call() {
            CallPermit::Reject { remaining } => assert_eq!(remaining, Duration::from_secs(40)),
            CallPermit::Allow => panic!("open breaker must reject"),
        }
        assert_eq!(cb.remaining_cooldown(), Some(Duration::from_secs(40)));
    }

    // -- Half-open ------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_exactly_one_trial() {
        let cb = CircuitBreaker::new("svc", test_config());
        open_breaker(&cb);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cb.before_call(), CallPermit::Allow);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(matches!(cb.before_call(), CallPermit::Reject { .. }));
        assert!(matches!(cb.before_call(), CallPermit::Reject { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn trial_success_closes() {
        let cb = CircuitBreaker::new("svc", test_config());
        open_breaker(&cb);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cb.before_call().is_allowed());

        let transition = cb.on_success();
        assert_eq!(transition, Some((CircuitState::HalfOpen, CircuitState::Closed)));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert!(cb.before_call().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn trial_failure_reopens_and_restarts_cooldown() {
        let cb = CircuitBreaker::new("svc", test_config());
        open_breaker(&cb);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cb.before_call().is_allowed());

        let transition = cb.on_failure();
        assert_eq!(transition, Some((CircuitState::HalfOpen, CircuitState::Open)));

        // The cooldown restarts from the failed trial.
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!cb.before_call().is_allowed());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.before_call().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn released_probe_admits_next_trial() {
        let cb = CircuitBreaker::new("svc", test_config());
        open_breaker(&cb);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cb.before_call().is_allowed());
        assert!(!cb.before_call().is_allowed());

        cb.release_probe();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.before_call().is_allowed());
        assert!(!cb.before_call().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_returns_to_closed() {
        let cb = CircuitBreaker::new("svc", test_config());
        open_breaker(&cb);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert!(cb.before_call().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn status_snapshot() {
        let cb = CircuitBreaker::new("analysis", test_config());
        let status = cb.status();
        assert_eq!(status.state, "closed");
        assert!(status.remaining_cooldown_seconds.is_none());

        open_breaker(&cb);
        tokio::time::advance(Duration::from_millis(500)).await;
        let status = cb.status();
        assert_eq!(status.service, "analysis");
        assert_eq!(status.state, "open");
        assert_eq!(status.consecutive_failures, 3);
        assert_eq!(status.failure_threshold, 3);
        assert_eq!(status.reset_timeout_seconds, 60);
        // 59.5s rounds up.
        assert_eq!(status.remaining_cooldown_seconds, Some(60));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_get_single_trial() {
        let cb = Arc::new(CircuitBreaker::new("svc", test_config()));
        open_breaker(&cb);
        tokio::time::advance(Duration::from_secs(60)).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cb = Arc::clone(&cb);
            handles.push(tokio::spawn(async move { cb.before_call().is_allowed() }));
        }
        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 1);
    }

    // -- Registry -------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn registry_creates_lazily_with_default() {
        let registry = CircuitBreakerRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.state("analysis"), CircuitState::Closed);
        assert!(registry.before_call("analysis").is_allowed());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("analysis").unwrap().config().failure_threshold,
            5
        );
    }

    #[tokio::test(start_paused = true)]
    async fn registry_applies_overrides() {
        let registry = CircuitBreakerRegistry::default().with_override("flaky", test_config());
        for _ in 0..3 {
            registry.on_failure("flaky");
        }
        assert_eq!(registry.state("flaky"), CircuitState::Open);

        for _ in 0..3 {
            registry.on_failure("stable");
        }
        assert_eq!(registry.state("stable"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn registry_keys_are_isolated() {
        let registry = CircuitBreakerRegistry::new(test_config());
        for _ in 0..3 {
            registry.on_failure("a");
        }
        assert!(!registry.before_call("a").is_allowed());
        assert!(registry.before_call("b").is_allowed());
        assert_eq!(registry.keys(), vec!["a".to_owned(), "b".to_owned()]);

        let statuses = registry.statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].state, "open");
        assert_eq!(statuses[1].state, "closed");
    }

    #[tokio::test(start_paused = true)]
    async fn registry_reset() {
        let registry = CircuitBreakerRegistry::new(test_config());
        assert!(!registry.reset("missing"));
        for _ in 0..3 {
            registry.on_failure("a");
        }
        assert!(registry.reset("a"));
        assert_eq!(registry.state("a"), CircuitState::Closed);
        assert_eq!(registry.status("a").unwrap().consecutive_failures, 0);
        assert!(registry.status("missing").is_none());
    }

    #[test]
    fn registry_validation_names_bad_override() {
        let registry = CircuitBreakerRegistry::default().with_override(
            "broken",
            CircuitBreakerConfig {
                failure_threshold: 0,
                reset_timeout: Duration::ZERO,
            },
        );
        let err = registry.validate().unwrap_err();
        assert!(err.contains("broken"));
    }
}
