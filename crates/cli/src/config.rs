use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use rentwise_executor::{CircuitBreakerConfig, CircuitBreakerRegistry, RetryOptions};
use rentwise_gateway::{DegradedModeConfig, OrchestratorConfig};
use rentwise_llm::AnalysisEndpointConfig;

/// Environment variable that supplies the API key when the file does not.
pub const API_KEY_ENV: &str = "RENTWISE_API_KEY";

/// Top-level configuration for the CLI, loaded from a TOML file.
///
/// # Example
///
/// ```toml
/// [endpoint]
/// url = "https://example.supabase.co/functions/v1/ai-analysis"
/// timeout_seconds = 30
///
/// [retry]
/// max_attempts = 3
/// base_delay_ms = 1000
///
/// [circuit_breaker]
/// failure_threshold = 5
/// reset_timeout_seconds = 60
///
/// [circuit_breaker.services.ai-analysis]
/// failure_threshold = 3
///
/// [degraded_mode]
/// failure_threshold = 3
/// cooldown_seconds = 300
///
/// [metrics]
/// currency = "€"
/// ```
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RentwiseConfig {
    /// Remote analysis endpoint.
    #[serde(default)]
    pub endpoint: EndpointConfig,
    /// Retry policy for analysis requests.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Circuit breaker defaults and per-service overrides.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerFileConfig,
    /// Degraded-mode thresholds.
    #[serde(default)]
    pub degraded_mode: DegradedModeFileConfig,
    /// Local narrative rendering.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EndpointConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Bearer token. Falls back to `RENTWISE_API_KEY`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Circuit breaker key of the service.
    #[serde(default = "default_service_key")]
    pub service_key: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
            service_key: default_service_key(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:54321/functions/v1/ai-analysis".to_owned()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_service_key() -> String {
    rentwise_gateway::DEFAULT_SERVICE_KEY.to_owned()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CircuitBreakerFileConfig {
    #[serde(default = "default_cb_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cb_reset_timeout")]
    pub reset_timeout_seconds: u64,
    /// Per-service overrides keyed by breaker key.
    #[serde(default)]
    pub services: HashMap<String, CircuitBreakerServiceConfig>,
}

impl Default for CircuitBreakerFileConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_cb_failure_threshold(),
            reset_timeout_seconds: default_cb_reset_timeout(),
            services: HashMap::new(),
        }
    }
}

fn default_cb_failure_threshold() -> u32 {
    5
}

fn default_cb_reset_timeout() -> u64 {
    60
}

/// Per-service circuit breaker overrides.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CircuitBreakerServiceConfig {
    pub failure_threshold: Option<u32>,
    pub reset_timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DegradedModeFileConfig {
    #[serde(default = "default_degraded_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

impl Default for DegradedModeFileConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_degraded_threshold(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

fn default_degraded_threshold() -> u32 {
    3
}

fn default_cooldown_seconds() -> u64 {
    300
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Currency symbol appended to amounts in the local narrative.
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
        }
    }
}

fn default_currency() -> String {
    "€".to_owned()
}

impl RentwiseConfig {
    /// Load the configuration from `path`, or defaults when no path is given.
    ///
    /// The API key from the environment is used when the file has none.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                Self::parse(&content)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };
        if config.endpoint.api_key.is_none() {
            config.endpoint.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn endpoint_config(&self) -> AnalysisEndpointConfig {
        let config = AnalysisEndpointConfig::new(self.endpoint.url.clone())
            .with_timeout(self.endpoint.timeout_seconds);
        match &self.endpoint.api_key {
            Some(key) => config.with_api_key(key.clone()),
            None => config,
        }
    }

    pub fn retry_options(&self) -> RetryOptions {
        RetryOptions::default()
            .with_max_attempts(self.retry.max_attempts)
            .with_base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .with_backoff_factor(self.retry.backoff_factor)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            service_key: self.endpoint.service_key.clone(),
            request_timeout: Duration::from_secs(self.endpoint.timeout_seconds),
            retry: self.retry_options(),
            currency: self.metrics.currency.clone(),
        }
    }

    /// Build the breaker registry, applying per-service overrides on top of
    /// the defaults.
    pub fn breaker_registry(&self) -> CircuitBreakerRegistry {
        let defaults = CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.failure_threshold,
            reset_timeout: Duration::from_secs(self.circuit_breaker.reset_timeout_seconds),
        };
        self.circuit_breaker
            .services
            .iter()
            .fold(CircuitBreakerRegistry::new(defaults.clone()), |registry, (key, service)| {
                let config = CircuitBreakerConfig {
                    failure_threshold: service
                        .failure_threshold
                        .unwrap_or(defaults.failure_threshold),
                    reset_timeout: service
                        .reset_timeout_seconds
                        .map_or(defaults.reset_timeout, Duration::from_secs),
                };
                registry.with_override(key.clone(), config)
            })
    }

    pub fn degraded_mode_config(&self) -> DegradedModeConfig {
        DegradedModeConfig {
            failure_threshold: self.degraded_mode.failure_threshold,
            cooldown: Duration::from_secs(self.degraded_mode.cooldown_seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = RentwiseConfig::parse("").unwrap();
        assert_eq!(config.endpoint.timeout_seconds, 30);
        assert_eq!(config.endpoint.service_key, "ai-analysis");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.degraded_mode.cooldown_seconds, 300);
        assert_eq!(config.metrics.currency, "€");

        let retry = config.retry_options();
        assert_eq!(retry.base_delay, Duration::from_secs(1));
        assert_eq!(retry.max_delay, Duration::from_secs(10));
        assert!(retry.validate().is_ok());
    }

    #[test]
    fn sections_override_defaults() {
        let toml = r#"
[endpoint]
url = "https://api.example.com/ai-analysis"
api_key = "secret"
timeout_seconds = 10

[retry]
max_attempts = 5
base_delay_ms = 250

[circuit_breaker]
failure_threshold = 4

[circuit_breaker.services.ai-analysis]
reset_timeout_seconds = 120

[degraded_mode]
failure_threshold = 2
cooldown_seconds = 60

[metrics]
currency = "USD"
"#;
        let config = RentwiseConfig::parse(toml).unwrap();
        assert_eq!(config.endpoint.api_key.as_deref(), Some("secret"));
        assert_eq!(config.retry_options().max_attempts, 5);
        assert_eq!(config.retry_options().base_delay, Duration::from_millis(250));

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.request_timeout, Duration::from_secs(10));
        assert_eq!(orchestrator.currency, "USD");

        let registry = config.breaker_registry();
        let breaker = registry.get_or_create("ai-analysis");
        assert_eq!(breaker.config().failure_threshold, 4);
        assert_eq!(breaker.config().reset_timeout, Duration::from_secs(120));
        let other = registry.get_or_create("other");
        assert_eq!(other.config().reset_timeout, Duration::from_secs(60));

        let degraded = config.degraded_mode_config();
        assert_eq!(degraded.failure_threshold, 2);
        assert_eq!(degraded.cooldown, Duration::from_secs(60));
    }

    #[test]
    fn api_key_is_never_serialized() {
        let config =
            RentwiseConfig::parse("[endpoint]\napi_key = \"secret\"\n").unwrap();
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("[endpoint]"));
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(RentwiseConfig::parse("[retry]\nmax_attempts = \"three\"\n").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = RentwiseConfig::load(Some(Path::new("/nonexistent/rentwise.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
