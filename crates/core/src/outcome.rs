use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a terminal analysis failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Transport-level failure reaching the remote service.
    NetworkError,
    /// The remote service answered with a non-success status.
    ServerError,
    /// Every attempt ran into the per-attempt deadline.
    Timeout,
    /// The user cancelled the request.
    UserCancelled,
    /// The remote response did not match the expected contract.
    ValidationError,
    /// The circuit breaker rejected the call.
    CircuitOpen,
    /// The retry budget ran out.
    MaxRetriesExceeded,
    /// The payload held no records; nothing was sent.
    InvalidPayload,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkError => "NETWORK_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::UserCancelled => "USER_CANCELLED",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::InvalidPayload => "INVALID_PAYLOAD",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a narrative came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    /// Validated response from the remote analysis service.
    Remote,
    /// Computed locally from the same records.
    LocalFallback,
    /// Typed in by the user.
    Manual,
}

/// The result of one analysis request, as handed to the caller.
///
/// Failures are always expressed through this type; the orchestrator never
/// returns a raw error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    /// Whether `narrative` has passed through the content sanitizer.
    pub sanitized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<NarrativeSource>,
}

impl AnalysisOutcome {
    /// A successful, sanitized narrative from the remote service.
    pub fn remote(narrative: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            narrative: Some(narrative.into()),
            sanitized: true,
            error_kind: None,
            user_message: None,
            source: Some(NarrativeSource::Remote),
        }
    }

    /// A sanitized narrative computed locally while the remote is unavailable.
    pub fn local_fallback(narrative: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            narrative: Some(narrative.into()),
            sanitized: true,
            error_kind: None,
            user_message: Some(user_message.into()),
            source: Some(NarrativeSource::LocalFallback),
        }
    }

    /// A sanitized narrative supplied by the user.
    pub fn manual(narrative: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            narrative: Some(narrative.into()),
            sanitized: true,
            error_kind: None,
            user_message: None,
            source: Some(NarrativeSource::Manual),
        }
    }

    /// A failed request with its classification and presentable message.
    pub fn failure(kind: ErrorKind, user_message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            narrative: None,
            sanitized: false,
            error_kind: Some(kind),
            user_message: Some(user_message.into()),
            source: None,
        }
    }
}
