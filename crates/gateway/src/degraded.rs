use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use rentwise_core::DegradedModeSnapshot;

/// Configuration for the degraded-mode controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedModeConfig {
    /// Consecutive terminal failures that switch to local narratives.
    pub failure_threshold: u32,
    /// How long the network stays skipped once degraded.
    pub cooldown: Duration,
}

impl DegradedModeConfig {
    #[must_use]
    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold;
        self
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold < 1 {
            return Err("degraded_mode.failure_threshold must be >= 1".into());
        }
        if self.cooldown.is_zero() {
            return Err("degraded_mode.cooldown must be > 0".into());
        }
        Ok(())
    }
}

impl Default for DegradedModeConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(300),
        }
    }
}

/// Answer of [`DegradedModeController::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedCheck {
    Normal,
    /// Skip the network; `remaining` is left on the cooldown.
    Degraded { remaining: Duration },
}

#[derive(Debug, Default)]
struct DegradedState {
    consecutive_failures: u32,
    degraded_until: Option<Instant>,
}

impl DegradedState {
    fn clear(&mut self) {
        self.consecutive_failures = 0;
        self.degraded_until = None;
    }
}

/// Request-level health tracker sitting above the circuit breaker.
///
/// Counts terminal failures of user-initiated requests. Once the threshold is
/// reached the orchestrator stops calling the network for the cooldown and
/// serves the local narrative instead. The first request after the cooldown
/// leaves degraded mode and tries the network again.
#[derive(Debug)]
pub struct DegradedModeController {
    config: DegradedModeConfig,
    state: Mutex<DegradedState>,
}

impl DegradedModeController {
    pub fn new(config: DegradedModeConfig) -> Self {
        Self {
            config,
            state: Mutex::new(DegradedState::default()),
        }
    }

    pub fn config(&self) -> &DegradedModeConfig {
        &self.config
    }

    /// Decide whether the next request may use the network.
    ///
    /// An expired cooldown is cleared here, resetting the failure counter.
    pub fn check(&self) -> DegradedCheck {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let Some(until) = state.degraded_until else {
            return DegradedCheck::Normal;
        };
        let now = Instant::now();
        if now < until {
            return DegradedCheck::Degraded {
                remaining: until - now,
            };
        }
        info!(
            failures = state.consecutive_failures,
            "degraded mode cooldown elapsed, resuming network requests"
        );
        state.clear();
        DegradedCheck::Normal
    }

    /// Record a terminal request failure.
    ///
    /// Returns `true` if this failure switched the controller to degraded.
    pub fn record_failure(&self) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.degraded_until.is_some()
            || state.consecutive_failures < self.config.failure_threshold
        {
            return false;
        }
        info!(
            failures = state.consecutive_failures,
            threshold = self.config.failure_threshold,
            cooldown_secs = self.config.cooldown.as_secs(),
            "entering degraded mode"
        );
        state.degraded_until = Some(Instant::now() + self.config.cooldown);
        true
    }

    /// Record a successful network-derived result.
    pub fn record_success(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.degraded_until.is_some() {
            info!("leaving degraded mode after successful analysis");
        }
        state.clear();
    }

    /// Return to normal operation regardless of timers.
    pub fn force_reset(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        info!(
            failures = state.consecutive_failures,
            was_degraded = state.degraded_until.is_some(),
            "degraded mode manually reset"
        );
        state.clear();
    }

    /// Read-only view for countdown display. Never changes state.
    pub fn snapshot(&self) -> DegradedModeSnapshot {
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let remaining = state
            .degraded_until
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(Instant::now()));
        DegradedModeSnapshot {
            is_degraded: !remaining.is_zero(),
            remaining_cooldown_seconds: remaining.as_secs()
                + u64::from(remaining.subsec_nanos() > 0),
            consecutive_failures: state.consecutive_failures,
        }
    }
}

impl Default for DegradedModeController {
    fn default() -> Self {
        Self::new(DegradedModeConfig::default())
    }
}
