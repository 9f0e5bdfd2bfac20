use std::time::Duration;

/// Configuration for the HTTP analysis endpoint.
#[derive(Clone)]
pub struct AnalysisEndpointConfig {
    /// Full URL of the analysis route (e.g., `https://api.example.com/ai-analysis`).
    pub url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Per-attempt request timeout in seconds.
    pub timeout_seconds: u64,
}

impl AnalysisEndpointConfig {
    /// Create a new config for `url` with a 30s timeout and no credentials.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout_seconds: 30,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the per-attempt request timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(format!("endpoint url must be http(s), got '{}'", self.url));
        }
        if self.timeout_seconds == 0 {
            return Err("timeout_seconds must be >= 1".into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for AnalysisEndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisEndpointConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}
