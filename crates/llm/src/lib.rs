pub mod config;
pub mod endpoint;
pub mod error;
pub mod fallback;
pub mod http;
pub mod mock;
pub mod sanitize;
pub mod validator;

pub use config::AnalysisEndpointConfig;
pub use endpoint::{AnalysisEndpoint, AnalysisRequest};
pub use error::AnalysisError;
pub use fallback::{
    MessageContext, SummaryError, TerminalFailure, classify_terminal_failure, degraded_message,
    is_validation_error, sanitized_summary, user_message,
};
pub use http::HttpAnalysisEndpoint;
pub use mock::{FailingEndpoint, MockEndpoint, ScriptedEndpoint, SlowEndpoint};
pub use sanitize::sanitize;
pub use validator::{
    CombinedAnalysis, Insight, Priority, SchemaMismatch, SectionAnalysis, ValidatedAnalysis,
    ValidationError, safe_validate, validate, validate_str,
};
