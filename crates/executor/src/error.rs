use std::time::Duration;

use thiserror::Error;

/// A call was rejected because the service's circuit breaker is open.
///
/// Never retried: the attempt loop terminates as soon as this is raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit open for service {key}, next trial in {}s", remaining.as_secs())]
pub struct CircuitOpenError {
    /// Service identifier of the rejecting breaker.
    pub key: String,
    /// Time until the breaker admits a trial call.
    pub remaining: Duration,
}

/// Why a retried operation ended without a value.
#[derive(Debug, Error)]
pub enum RetryFailure<E> {
    /// The last failure returned by the operation.
    #[error("{0}")]
    Operation(E),

    /// The circuit breaker rejected an attempt.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// The cancellation token fired before the loop finished.
    #[error("operation cancelled")]
    Cancelled,
}

impl<E> RetryFailure<E> {
    /// The operation's own failure, if that is what ended the loop.
    pub fn operation(&self) -> Option<&E> {
        match self {
            Self::Operation(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }
}

/// Result of [`RetryExecutor::execute`](crate::RetryExecutor::execute).
///
/// Exactly one of value or failure is present, by construction of `outcome`.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub outcome: Result<T, RetryFailure<E>>,
    /// Number of times the operation was actually invoked.
    pub attempts_made: u32,
    /// Sum of all completed backoff sleeps.
    pub cumulative_delay: Duration,
}

impl<T, E> RetryResult<T, E> {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn into_result(self) -> Result<T, RetryFailure<E>> {
        self.outcome
    }
}
