use async_trait::async_trait;
use serde::Serialize;

use rentwise_core::{AnalysisKind, AnalysisPayload};

use crate::error::AnalysisError;

/// Body sent to the remote analysis service.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    #[serde(rename = "type")]
    pub kind: AnalysisKind,
    #[serde(flatten)]
    pub payload: AnalysisPayload,
}

impl AnalysisRequest {
    pub fn new(kind: AnalysisKind, payload: AnalysisPayload) -> Self {
        Self { kind, payload }
    }
}

/// Trait for services that produce an AI analysis of business records.
///
/// Implementations return the decoded response body untouched; shape
/// checking is the validator's job. A body that is not JSON should be
/// returned as a JSON string so the validator can report it.
#[async_trait]
pub trait AnalysisEndpoint: Send + Sync + std::fmt::Debug {
    async fn submit(&self, request: &AnalysisRequest) -> Result<serde_json::Value, AnalysisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_shape() {
        let request = AnalysisRequest::new(AnalysisKind::Combined, AnalysisPayload::default());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "combined");
        assert!(json["transactions"].as_array().unwrap().is_empty());
        assert!(json["reservations"].as_array().unwrap().is_empty());
    }
}
