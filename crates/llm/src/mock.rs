use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::endpoint::{AnalysisEndpoint, AnalysisRequest};
use crate::error::AnalysisError;

/// A mock endpoint that always returns the same body.
#[derive(Debug)]
pub struct MockEndpoint {
    response: Value,
    calls: AtomicU32,
}

impl MockEndpoint {
    pub fn new(response: Value) -> Self {
        Self {
            response,
            calls: AtomicU32::new(0),
        }
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisEndpoint for MockEndpoint {
    async fn submit(&self, _request: &AnalysisRequest) -> Result<Value, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// A mock endpoint that always fails with the same error.
#[derive(Debug)]
pub struct FailingEndpoint {
    error: AnalysisError,
    calls: AtomicU32,
}

impl FailingEndpoint {
    pub fn new(error: AnalysisError) -> Self {
        Self {
            error,
            calls: AtomicU32::new(0),
        }
    }

    /// Fails with a transport error after connecting.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AnalysisError::Network(message.into()))
    }

    /// Fails as if the host could not be reached.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(AnalysisError::Unreachable(message.into()))
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(AnalysisError::Server {
            status,
            message: message.into(),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisEndpoint for FailingEndpoint {
    async fn submit(&self, _request: &AnalysisRequest) -> Result<Value, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// A mock endpoint that replays a script of results in order.
///
/// Once the script runs out, the last entry is repeated.
#[derive(Debug)]
pub struct ScriptedEndpoint {
    script: Mutex<VecDeque<Result<Value, AnalysisError>>>,
    last: Mutex<Option<Result<Value, AnalysisError>>>,
    calls: AtomicU32,
}

impl ScriptedEndpoint {
    pub fn new(script: impl IntoIterator<Item = Result<Value, AnalysisError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisEndpoint for ScriptedEndpoint {
    async fn submit(&self, _request: &AnalysisRequest) -> Result<Value, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(next) = next {
            *last = Some(next);
        }
        last.clone().unwrap_or_else(|| {
            Err(AnalysisError::Configuration(
                "scripted endpoint has no responses".into(),
            ))
        })
    }
}

/// A mock endpoint that waits before answering.
#[derive(Debug)]
pub struct SlowEndpoint {
    delay: Duration,
    response: Value,
    calls: AtomicU32,
}

impl SlowEndpoint {
    pub fn new(delay: Duration, response: Value) -> Self {
        Self {
            delay,
            response,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisEndpoint for SlowEndpoint {
    async fn submit(&self, _request: &AnalysisRequest) -> Result<Value, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentwise_core::{AnalysisKind, AnalysisPayload};
    use serde_json::json;

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(AnalysisKind::Combined, AnalysisPayload::default())
    }

    #[tokio::test]
    async fn mock_counts_calls() {
        let endpoint = MockEndpoint::new(json!({"success": true}));
        endpoint.submit(&request()).await.unwrap();
        endpoint.submit(&request()).await.unwrap();
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test]
    async fn failing_returns_error() {
        let endpoint = FailingEndpoint::server(503, "down");
        let err = endpoint.submit(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Server { status: 503, .. }));
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn scripted_replays_then_repeats_last() {
        let endpoint = ScriptedEndpoint::new([
            Err(AnalysisError::Network("reset".into())),
            Ok(json!({"n": 2})),
        ]);
        assert!(endpoint.submit(&request()).await.is_err());
        assert_eq!(endpoint.submit(&request()).await.unwrap(), json!({"n": 2}));
        assert_eq!(endpoint.submit(&request()).await.unwrap(), json!({"n": 2}));
        assert_eq!(endpoint.calls(), 3);
    }

    #[tokio::test]
    async fn empty_script_errors() {
        let endpoint = ScriptedEndpoint::new([]);
        assert!(endpoint.submit(&request()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_waits() {
        let endpoint = SlowEndpoint::new(Duration::from_secs(5), json!(1));
        let start = tokio::time::Instant::now();
        endpoint.submit(&request()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
