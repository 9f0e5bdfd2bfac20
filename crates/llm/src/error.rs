use std::time::Duration;

use thiserror::Error;

use crate::fallback::SummaryError;
use crate::validator::ValidationError;

/// Errors raised by a single analysis attempt.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// The service could not be reached at all.
    #[error("failed to fetch: {0}")]
    Unreachable(String),

    /// A transport error occurred after the connection was established.
    #[error("network error: {0}")]
    Network(String),

    /// The attempt did not complete within the per-attempt deadline.
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The service answered with a non-success status.
    #[error("server error: HTTP {status}: {message}")]
    Server { status: u16, message: String },

    /// The response did not match the expected contract.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The validated response carried no usable narrative.
    #[error(transparent)]
    Summary(#[from] SummaryError),

    /// The endpoint was given invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AnalysisError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub(crate) fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_connect() {
            Self::Unreachable(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
