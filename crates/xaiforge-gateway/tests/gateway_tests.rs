//! Tests for xaiforge-gateway: mock determinism, stream ordering, timeout,
//! retry, circuit breaking and request batching

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;

use xaiforge_gateway::{
    BatchConfig, ChatRole, CircuitBreaker, GatewayConfig, GatewayError, MockProvider,
    ModelMessage, ModelProvider, ModelRequest, ModelResponse, ModelGateway, RetryPolicy,
    ToolDefinition,
};

fn request(content: &str) -> ModelRequest {
    ModelRequest {
        messages: vec![ModelMessage::user(content)],
        ..Default::default()
    }
}

// ===========================================================================
// Test providers
// ===========================================================================

struct SlowProvider {
    delay: Duration,
}

#[async_trait::async_trait]
impl ModelProvider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }
    fn model(&self) -> &str {
        "mock-001"
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError> {
        tokio::time::sleep(self.delay).await;
        MockProvider::default().generate(request).await
    }
}

struct FlakyProvider {
    failures_left: AtomicUsize,
}

#[async_trait::async_trait]
impl ModelProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }
    fn model(&self) -> &str {
        "mock-001"
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GatewayError::Provider("temporary failure".to_string()));
        }
        MockProvider::default().generate(request).await
    }
}

struct AlwaysFailing;

#[async_trait::async_trait]
impl ModelProvider for AlwaysFailing {
    fn name(&self) -> &str {
        "failing"
    }
    fn model(&self) -> &str {
        "mock-001"
    }

    async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, GatewayError> {
        Err(GatewayError::Provider("boom".to_string()))
    }
}

struct CountingBatchProvider {
    batch_calls: AtomicUsize,
}

#[async_trait::async_trait]
impl ModelProvider for CountingBatchProvider {
    fn name(&self) -> &str {
        "counting"
    }
    fn model(&self) -> &str {
        "mock-001"
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError> {
        MockProvider::default().generate(request).await
    }

    async fn generate_batch(
        &self,
        requests: Vec<ModelRequest>,
    ) -> Result<Vec<ModelResponse>, GatewayError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            responses.push(self.generate(request).await?);
        }
        Ok(responses)
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay_s: 0.005,
        max_delay_s: 0.02,
        jitter: 0.001,
    }
}

// ===========================================================================
// Mock provider
// ===========================================================================

#[tokio::test]
async fn mock_is_deterministic_for_identical_requests() {
    let provider = MockProvider::default();
    let first = provider.generate(request("stable text")).await.unwrap();
    let second = provider.generate(request("stable text")).await.unwrap();
    assert_eq!(first.text, second.text);
    assert!(first.text.starts_with("MOCK["));
    assert!(first.text.ends_with("stable text"));
    assert!(first.usage.total_tokens >= 2);
}

#[tokio::test]
async fn mock_honours_expected_text_override() {
    let provider = MockProvider::default();
    let mut req = request("anything");
    req.metadata
        .insert("expected_text".to_string(), json!("forced output"));
    let response = provider.generate(req).await.unwrap();
    assert_eq!(response.text, "forced output");
}

#[tokio::test]
async fn mock_honours_tool_call_override() {
    let provider = MockProvider::default();
    let mut req = request("anything");
    req.tools.push(ToolDefinition {
        name: "calc".to_string(),
        description: String::new(),
        schema: json!({}),
    });
    req.metadata.insert(
        "tool_call_override".to_string(),
        json!({"name": "calc", "arguments": {"expression": "2+2"}}),
    );
    let response = provider.generate(req).await.unwrap();
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "calc");
    assert_eq!(response.tool_calls[0].arguments["expression"], json!("2+2"));
}

#[tokio::test]
async fn mock_force_tool_call_uses_first_tool() {
    let provider = MockProvider::default();
    let mut req = request("anything");
    req.tools.push(ToolDefinition {
        name: "first_tool".to_string(),
        description: String::new(),
        schema: json!({}),
    });
    req.metadata
        .insert("force_tool_call".to_string(), json!(true));
    let response = provider.generate(req).await.unwrap();
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "first_tool");
}

// ===========================================================================
// Streaming
// ===========================================================================

#[tokio::test]
async fn stream_orders_chunks_with_single_terminal() {
    let gateway = ModelGateway::with_provider(
        GatewayConfig::default(),
        Arc::new(MockProvider {
            latency_ms: 1,
            ..Default::default()
        }),
    );
    let mut stream = gateway.stream(request("streaming test run")).await.unwrap();
    let mut chunks = Vec::new();
    while let Some(event) = stream.next().await {
        chunks.push(event.unwrap().chunk);
    }
    assert!(!chunks.is_empty());
    assert!(chunks.last().unwrap().is_final);
    assert_eq!(chunks.iter().filter(|chunk| chunk.is_final).count(), 1);
    let indices: Vec<u64> = chunks.iter().map(|chunk| chunk.index).collect();
    let mut sorted = indices.clone();
    sorted.sort_unstable();
    assert_eq!(indices, sorted);
}

#[tokio::test]
async fn default_stream_is_one_final_chunk() {
    struct Plain;
    #[async_trait::async_trait]
    impl ModelProvider for Plain {
        fn name(&self) -> &str {
            "plain"
        }
        fn model(&self) -> &str {
            "m"
        }
        async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError> {
            MockProvider::default().generate(request).await
        }
    }
    let mut stream = Plain.stream(request("single")).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert!(first.chunk.is_final);
    assert!(stream.next().await.is_none());
}

// ===========================================================================
// Timeout / retry / circuit
// ===========================================================================

#[tokio::test]
async fn gateway_times_out_slow_provider() {
    let config = GatewayConfig {
        timeout_s: 0.05,
        retry: fast_retry(2),
        ..Default::default()
    };
    let gateway = ModelGateway::with_provider(
        config,
        Arc::new(SlowProvider {
            delay: Duration::from_millis(200),
        }),
    );
    let error = gateway.generate(request("slow")).await.unwrap_err();
    assert!(matches!(error, GatewayError::Timeout(_)));
}

#[tokio::test]
async fn gateway_retries_transient_failure() {
    let config = GatewayConfig {
        retry: fast_retry(2),
        ..Default::default()
    };
    let gateway = ModelGateway::with_provider(
        config,
        Arc::new(FlakyProvider {
            failures_left: AtomicUsize::new(1),
        }),
    );
    let result = gateway.generate(request("retry")).await.unwrap();
    assert_eq!(result.attempts, 2);
    assert!(result.response.text.starts_with("MOCK["));
}

#[tokio::test]
async fn gateway_surfaces_error_after_budget() {
    let config = GatewayConfig {
        retry: fast_retry(3),
        ..Default::default()
    };
    let gateway = ModelGateway::with_provider(config, Arc::new(AlwaysFailing));
    let error = gateway.generate(request("doomed")).await.unwrap_err();
    assert!(matches!(error, GatewayError::Provider(_)));
}

#[tokio::test]
async fn circuit_opens_after_threshold_and_fails_fast() {
    let config = GatewayConfig {
        retry: fast_retry(1),
        circuit_breaker: true,
        circuit_failures: 1,
        circuit_reset_s: 60.0,
        ..Default::default()
    };
    let gateway = ModelGateway::with_provider(config, Arc::new(AlwaysFailing));
    let first = gateway.generate(request("one")).await.unwrap_err();
    assert!(matches!(first, GatewayError::Provider(_)));
    let second = gateway.generate(request("two")).await.unwrap_err();
    assert!(matches!(second, GatewayError::CircuitOpen));
}

#[tokio::test]
async fn circuit_recloses_after_reset_timeout() {
    let mut breaker = CircuitBreaker::new(1, Duration::from_millis(10));
    breaker.record_failure();
    assert!(!breaker.allow());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(breaker.allow());
    breaker.record_success();
    assert!(!breaker.is_open());
}

#[test]
fn backoff_grows_and_caps() {
    let policy = RetryPolicy {
        max_attempts: 5,
        base_delay_s: 0.2,
        max_delay_s: 2.0,
        jitter: 0.1,
    };
    let first = policy.backoff(1).as_secs_f64();
    assert!((0.2..0.3).contains(&first), "attempt 1 backoff {first}");
    let second = policy.backoff(2).as_secs_f64();
    assert!((0.4..0.5).contains(&second), "attempt 2 backoff {second}");
    let capped = policy.backoff(10).as_secs_f64();
    assert!(capped <= 2.1, "capped backoff {capped}");
}

// ===========================================================================
// Batching
// ===========================================================================

#[tokio::test]
async fn batching_coalesces_concurrent_requests() {
    let provider = Arc::new(CountingBatchProvider {
        batch_calls: AtomicUsize::new(0),
    });
    let config = GatewayConfig {
        batch: BatchConfig {
            enabled: true,
            max_batch_size: 2,
            max_wait_ms: 25,
        },
        ..Default::default()
    };
    let gateway = Arc::new(ModelGateway::with_provider(config, provider.clone()));
    let mut req_a = request("batch A");
    req_a.request_id = Some("req-a".to_string());
    let mut req_b = request("batch B");
    req_b.request_id = Some("req-b".to_string());
    let (result_a, result_b) =
        tokio::join!(gateway.generate(req_a), gateway.generate(req_b));
    let result_a = result_a.unwrap();
    let result_b = result_b.unwrap();
    assert_eq!(result_a.response.provider, "mock");
    assert_eq!(result_b.response.provider, "mock");
    // Responses are matched back to their waiters by position.
    assert_eq!(result_a.response.request_id.as_deref(), Some("req-a"));
    assert_eq!(result_b.response.request_id.as_deref(), Some("req-b"));
    assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn batching_propagates_handler_failure_to_all_waiters() {
    struct FailingBatch;
    #[async_trait::async_trait]
    impl ModelProvider for FailingBatch {
        fn name(&self) -> &str {
            "failing-batch"
        }
        fn model(&self) -> &str {
            "m"
        }
        async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, GatewayError> {
            Err(GatewayError::Provider("no direct calls".to_string()))
        }
        async fn generate_batch(
            &self,
            _requests: Vec<ModelRequest>,
        ) -> Result<Vec<ModelResponse>, GatewayError> {
            Err(GatewayError::Provider("batch exploded".to_string()))
        }
    }
    let config = GatewayConfig {
        retry: fast_retry(1),
        batch: BatchConfig {
            enabled: true,
            max_batch_size: 2,
            max_wait_ms: 10,
        },
        ..Default::default()
    };
    let gateway = Arc::new(ModelGateway::with_provider(config, Arc::new(FailingBatch)));
    let (result_a, result_b) = tokio::join!(
        gateway.generate(request("a")),
        gateway.generate(request("b"))
    );
    assert!(result_a.is_err());
    assert!(result_b.is_err());
}

// ===========================================================================
// Request payload / config
// ===========================================================================

#[test]
fn request_payload_is_canonical() {
    let req = request("same");
    let other = request("same");
    assert_eq!(req.to_payload().to_string(), other.to_payload().to_string());
}

#[test]
fn chat_role_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&ChatRole::User).unwrap(), "\"user\"");
    assert_eq!(
        serde_json::to_string(&ChatRole::Assistant).unwrap(),
        "\"assistant\""
    );
}

#[test]
fn gateway_config_parses_partial_json() {
    let payload = json!({
        "provider": "local-http",
        "timeout_s": 2.5,
        "batch": {"enabled": true},
        "circuit_breaker": true
    });
    let config: GatewayConfig = serde_json::from_value(payload).unwrap();
    assert_eq!(config.provider, "local-http");
    assert_eq!(config.timeout_s, 2.5);
    assert!(config.batch.enabled);
    assert_eq!(config.batch.max_batch_size, 4);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.circuit_failures, 3);
}

#[test]
fn model_request_defaults_match_contract() {
    let req = ModelRequest::default();
    assert_eq!(req.temperature, 0.2);
    assert_eq!(req.max_tokens, 512);
    assert!(req.seed.is_none());
    assert!(req.metadata.is_empty());
}
