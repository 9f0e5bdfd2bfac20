use std::error::Error;
use std::time::Duration;

use thiserror::Error;

use rentwise_core::{AnalysisKind, ErrorKind};

use crate::error::AnalysisError;
use crate::sanitize::sanitize;
use crate::validator::{ValidatedAnalysis, ValidationError};

/// A validated response that still cannot be shown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummaryError {
    #[error("expected a {expected} analysis, got {actual}")]
    KindMismatch {
        expected: AnalysisKind,
        actual: AnalysisKind,
    },

    #[error("{0} analysis has no narrative")]
    MissingNarrative(AnalysisKind),

    #[error("narrative is empty after sanitization")]
    EmptyAfterSanitize,
}

/// Extract and sanitize the narrative for `expected`.
pub fn sanitized_summary(
    response: &ValidatedAnalysis,
    expected: AnalysisKind,
) -> Result<String, SummaryError> {
    if response.kind() != expected {
        return Err(SummaryError::KindMismatch {
            expected,
            actual: response.kind(),
        });
    }
    let narrative = response.narrative();
    if narrative.trim().is_empty() {
        return Err(SummaryError::MissingNarrative(expected));
    }
    let clean = sanitize(narrative);
    if clean.trim().is_empty() {
        return Err(SummaryError::EmptyAfterSanitize);
    }
    Ok(clean)
}

/// Classification of a request that ran out of options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalFailure {
    pub error_kind: ErrorKind,
    pub user_message: String,
}

/// Parameters substituted into user-facing message templates.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext {
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Remaining breaker cooldown, for circuit-open messages.
    pub cooldown: Duration,
}

const FETCH_FAILURE_SIGNATURES: &[&str] = &["failed to fetch", "fetch failed", "error sending request"];
const CANCEL_SIGNATURES: &[&str] = &["cancelled", "canceled", "aborted"];

/// Classify the final failure of a request. First match wins:
/// timeout, then generic fetch failure, then user abort, otherwise the retry
/// budget ran out.
pub fn classify_terminal_failure(
    message: &str,
    was_timeout: bool,
    timeout: Duration,
    max_attempts: u32,
) -> TerminalFailure {
    let lower = message.to_lowercase();
    let error_kind = if was_timeout {
        ErrorKind::Timeout
    } else if FETCH_FAILURE_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
        ErrorKind::NetworkError
    } else if CANCEL_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
        ErrorKind::UserCancelled
    } else {
        ErrorKind::MaxRetriesExceeded
    };
    let ctx = MessageContext {
        timeout,
        max_attempts,
        cooldown: Duration::ZERO,
    };
    TerminalFailure {
        error_kind,
        user_message: user_message(error_kind, &ctx),
    }
}

/// Fixed user-presentable message for each error kind.
pub fn user_message(kind: ErrorKind, ctx: &MessageContext) -> String {
    match kind {
        ErrorKind::Timeout => format!(
            "The analysis service did not respond within {} seconds. Please try again later.",
            ctx.timeout.as_secs()
        ),
        ErrorKind::NetworkError => {
            "Could not reach the analysis service. Check your internet connection and try again."
                .to_owned()
        }
        ErrorKind::UserCancelled => "The analysis was cancelled.".to_owned(),
        ErrorKind::MaxRetriesExceeded => format!(
            "The analysis service is unavailable after {} attempts. Please try again later.",
            ctx.max_attempts
        ),
        ErrorKind::ServerError => {
            "The analysis service reported an error. Please try again later.".to_owned()
        }
        ErrorKind::ValidationError => {
            "The analysis service returned an unexpected response. Please try again later."
                .to_owned()
        }
        ErrorKind::CircuitOpen => format!(
            "The analysis service is temporarily paused after repeated failures. Try again in {}.",
            countdown(ctx.cooldown)
        ),
        ErrorKind::InvalidPayload => {
            "There is nothing to analyze yet. Add transactions or reservations first.".to_owned()
        }
    }
}

/// Message shown alongside the local narrative while degraded.
pub fn degraded_message(remaining: Duration) -> String {
    format!(
        "The analysis service is unavailable. Showing a locally computed summary; \
         the service will be retried in {}.",
        countdown(remaining)
    )
}

/// Returns `true` if `err` or any of its sources is a validation failure.
///
/// A response that validated but yields no usable narrative counts too.
pub fn is_validation_error(err: &(dyn Error + 'static)) -> bool {
    std::iter::successors(Some(err), |&e| e.source()).any(|e| {
        e.is::<ValidationError>()
            || e.is::<SummaryError>()
            || e.downcast_ref::<AnalysisError>().is_some_and(|a| {
                matches!(a, AnalysisError::Validation(_) | AnalysisError::Summary(_))
            })
    })
}

fn countdown(remaining: Duration) -> String {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}
