use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::AnalysisEndpointConfig;
use crate::endpoint::{AnalysisEndpoint, AnalysisRequest};
use crate::error::AnalysisError;

/// Longest slice of a non-JSON error body kept in an error message.
const MAX_ERROR_BODY: usize = 200;

/// HTTP analysis endpoint: POSTs the request as JSON and returns the decoded
/// body.
#[derive(Debug)]
pub struct HttpAnalysisEndpoint {
    client: reqwest::Client,
    config: AnalysisEndpointConfig,
}

impl HttpAnalysisEndpoint {
    /// Create a new HTTP endpoint with the given configuration.
    pub fn new(config: AnalysisEndpointConfig) -> Result<Self, AnalysisError> {
        config.validate().map_err(AnalysisError::Configuration)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AnalysisError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &AnalysisEndpointConfig {
        &self.config
    }

    /// Pull a human-readable message out of an error body: the JSON `error`
    /// or `message` field when present, otherwise a prefix of the raw text.
    fn error_message(body: &str) -> String {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body)
            && let Some(message) = ["error", "message"]
                .iter()
                .find_map(|key| value.get(key).and_then(serde_json::Value::as_str))
        {
            return message.to_owned();
        }
        let trimmed = body.trim();
        match trimmed.char_indices().nth(MAX_ERROR_BODY) {
            Some((cut, _)) => format!("{}...", &trimmed[..cut]),
            None => trimmed.to_owned(),
        }
    }
}

#[async_trait]
impl AnalysisEndpoint for HttpAnalysisEndpoint {
    async fn submit(&self, request: &AnalysisRequest) -> Result<serde_json::Value, AnalysisError> {
        debug!(
            url = %self.config.url,
            kind = %request.kind,
            records = request.payload.len(),
            "sending analysis request"
        );

        let mut builder = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AnalysisError::from_reqwest(&e, self.config.timeout()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::from_reqwest(&e, self.config.timeout()))?;

        if !status.is_success() {
            let message = Self::error_message(&body);
            warn!(status = %status, error = %message, "analysis service returned error");
            return Err(AnalysisError::Server {
                status: status.as_u16(),
                message,
            });
        }

        // A 2xx body that is not JSON is handed on as a string; the validator
        // reports it.
        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }
}
