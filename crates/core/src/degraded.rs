use serde::{Deserialize, Serialize};

/// Read-only view of the degraded-mode controller, for countdown display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedModeSnapshot {
    pub is_degraded: bool,
    /// Whole seconds until the next network attempt is allowed, rounded up.
    pub remaining_cooldown_seconds: u64,
    pub consecutive_failures: u32,
}
