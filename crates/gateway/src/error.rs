use thiserror::Error;

/// Errors raised while assembling an [`AnalysisOrchestrator`](crate::AnalysisOrchestrator).
///
/// Request-time failures never surface here; they are reported through
/// [`AnalysisOutcome`](rentwise_core::AnalysisOutcome).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The orchestrator was misconfigured (e.g. missing required components).
    #[error("configuration error: {0}")]
    Configuration(String),
}
