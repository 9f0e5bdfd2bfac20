//! Resilient orchestration of remote narrative analysis.
//!
//! [`AnalysisOrchestrator`] combines the retry executor, the per-service
//! circuit breaker, response validation and content sanitization, and falls
//! back to a locally computed narrative once repeated failures put it in
//! degraded mode.

pub mod builder;
pub mod degraded;
pub mod error;
pub mod metrics;
pub mod orchestrator;

pub use builder::OrchestratorBuilder;
pub use degraded::{DegradedCheck, DegradedModeConfig, DegradedModeController};
pub use error::OrchestratorError;
pub use metrics::{MetricsSnapshot, OrchestratorMetrics};
pub use orchestrator::{
    AnalysisOrchestrator, AnalysisProgress, DEFAULT_SERVICE_KEY, OrchestratorConfig,
    ProgressHook, RequestOptions,
};
