pub mod analysis;
pub mod circuit_breaker;
pub mod degraded;
pub mod error;
pub mod metrics;
pub mod outcome;
pub mod record;

pub use analysis::AnalysisKind;
pub use circuit_breaker::CircuitBreakerStatus;
pub use degraded::DegradedModeSnapshot;
pub use error::{PayloadError, json_type_name};
pub use metrics::{KpiNarrator, LocalMetrics, MetricsContext};
pub use outcome::{AnalysisOutcome, ErrorKind, NarrativeSource};
pub use record::{
    AnalysisPayload, Reservation, ReservationStatus, Transaction, TransactionKind,
};
