use serde::{Deserialize, Serialize};

/// Summary of a single circuit breaker's current state and configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    /// Service identifier the breaker guards.
    pub service: String,
    /// Current circuit state ("closed", "open", "`half_open`").
    pub state: String,
    /// Failures recorded since the last success.
    pub consecutive_failures: u32,
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Cooldown before an open circuit admits a trial call, in seconds.
    pub reset_timeout_seconds: u64,
    /// Seconds left before an open circuit admits a trial call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_cooldown_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_status_omits_cooldown() {
        let status = CircuitBreakerStatus {
            service: "analysis".into(),
            state: "closed".into(),
            consecutive_failures: 0,
            failure_threshold: 5,
            reset_timeout_seconds: 60,
            remaining_cooldown_seconds: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "closed");
        assert!(json.get("remaining_cooldown_seconds").is_none());
    }
}
