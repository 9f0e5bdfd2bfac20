pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod executor;
pub mod retry;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};
pub use config::{RetryCondition, RetryHook, RetryOptions, default_retry_condition};
pub use error::{CircuitOpenError, RetryFailure, RetryResult};
pub use executor::RetryExecutor;
pub use retry::{BackoffPolicy, compute_delay};
