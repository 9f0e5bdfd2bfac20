use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking analysis request outcomes.
///
/// All counters use relaxed ordering. For a consistent point-in-time view,
/// call [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct OrchestratorMetrics {
    /// Total number of analysis requests received.
    pub requests: AtomicU64,
    /// Requests answered with a validated remote narrative.
    pub remote_successes: AtomicU64,
    /// Requests answered with the locally computed narrative.
    pub local_fallbacks: AtomicU64,
    /// Narratives typed in by the user.
    pub manual_narratives: AtomicU64,
    /// Requests that ended in a terminal failure.
    pub failures: AtomicU64,
    /// Terminal failures caused by a malformed remote response.
    pub validation_failures: AtomicU64,
    /// Requests rejected because the service circuit breaker was open.
    pub circuit_open: AtomicU64,
    /// Requests cancelled by the user.
    pub cancellations: AtomicU64,
    /// Requests rejected before sending because the payload was empty.
    pub invalid_payloads: AtomicU64,
}

impl OrchestratorMetrics {
    /// Increment the requests counter.
    pub fn increment_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the remote successes counter.
    pub fn increment_remote_successes(&self) {
        self.remote_successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the local fallbacks counter.
    pub fn increment_local_fallbacks(&self) {
        self.local_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the manual narratives counter.
    pub fn increment_manual_narratives(&self) {
        self.manual_narratives.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the failures counter.
    pub fn increment_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the validation failures counter.
    pub fn increment_validation_failures(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the circuit-open counter.
    pub fn increment_circuit_open(&self) {
        self.circuit_open.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the cancellations counter.
    pub fn increment_cancellations(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the invalid payloads counter.
    pub fn increment_invalid_payloads(&self) {
        self.invalid_payloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            remote_successes: self.remote_successes.load(Ordering::Relaxed),
            local_fallbacks: self.local_fallbacks.load(Ordering::Relaxed),
            manual_narratives: self.manual_narratives.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            circuit_open: self.circuit_open.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            invalid_payloads: self.invalid_payloads.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`OrchestratorMetrics`] at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub remote_successes: u64,
    pub local_fallbacks: u64,
    pub manual_narratives: u64,
    pub failures: u64,
    pub validation_failures: u64,
    pub circuit_open: u64,
    pub cancellations: u64,
    pub invalid_payloads: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_and_snapshot() {
        let metrics = OrchestratorMetrics::default();
        metrics.increment_requests();
        metrics.increment_requests();
        metrics.increment_remote_successes();
        metrics.increment_failures();
        metrics.increment_validation_failures();
        metrics.increment_local_fallbacks();

        let snap = metrics.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.remote_successes, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.validation_failures, 1);
        assert_eq!(snap.local_fallbacks, 1);
        assert_eq!(snap.circuit_open, 0);
        assert_eq!(snap.cancellations, 0);
    }

    #[test]
    fn snapshot_default_is_zero() {
        let metrics = OrchestratorMetrics::default();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let metrics = OrchestratorMetrics::default();
        metrics.increment_circuit_open();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["circuitOpen"], 1);
        assert_eq!(json["remoteSuccesses"], 0);
    }
}
