//! The model gateway: timeout, retry, circuit breaking and batching

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::batching::BatchScheduler;
use crate::config::GatewayConfig;
use crate::models::{
    GatewayError, ModelProvider, ModelRequest, ModelResponse, ModelStream,
};
use crate::providers::{LocalHttpProvider, MockProvider, OpenAiCompatProvider};
use crate::reliability::CircuitBreaker;

#[derive(Clone, Debug)]
pub struct GatewayResult {
    pub response: ModelResponse,
    pub attempts: u32,
    pub latency_ms: u64,
}

pub struct ModelGateway {
    config: GatewayConfig,
    provider: Arc<dyn ModelProvider>,
    breaker: Mutex<CircuitBreaker>,
    batcher: Option<BatchScheduler>,
}

impl ModelGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let provider = resolve_provider(&config.provider);
        Self::with_provider(config, provider)
    }

    pub fn with_provider(config: GatewayConfig, provider: Arc<dyn ModelProvider>) -> Self {
        let breaker = Mutex::new(CircuitBreaker::new(
            config.circuit_failures,
            Duration::from_secs_f64(config.circuit_reset_s),
        ));
        let batcher = config
            .batch
            .enabled
            .then(|| BatchScheduler::start(provider.clone(), config.batch));
        Self {
            config,
            provider,
            breaker,
            batcher,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError> {
        if self.config.circuit_breaker && !self.breaker.lock().expect("breaker lock").allow() {
            return Err(GatewayError::CircuitOpen);
        }
        let started = Instant::now();
        let response = match tokio::time::timeout(
            Duration::from_secs_f64(self.config.timeout_s),
            self.provider.generate(request),
        )
        .await
        {
            Err(_) => return Err(GatewayError::Timeout(self.config.timeout_s)),
            Ok(result) => result?,
        };
        debug!(
            provider = %response.provider,
            model = %response.model,
            latency_ms = started.elapsed().as_millis() as u64,
            request_id = response.request_id.as_deref().unwrap_or(""),
            "gateway response"
        );
        if self.config.circuit_breaker {
            self.breaker
                .lock()
                .expect("breaker lock")
                .record_success();
        }
        Ok(response)
    }

    /// Generate with the full reliability stack. Only the final successful
    /// response is surfaced; failed attempts never leak partial state.
    pub async fn generate(&self, request: ModelRequest) -> Result<GatewayResult, GatewayError> {
        let mut attempts = 0u32;
        let started = Instant::now();
        let policy = self.config.retry;
        loop {
            attempts += 1;
            let outcome = match &self.batcher {
                Some(batcher) => batcher.submit(request.clone()).await,
                None => self.invoke(request.clone()).await,
            };
            match outcome {
                Ok(response) => {
                    return Ok(GatewayResult {
                        response,
                        attempts,
                        latency_ms: started.elapsed().as_millis() as u64,
                    });
                }
                // An open breaker fails fast; retrying would only spin on it.
                Err(GatewayError::CircuitOpen) => return Err(GatewayError::CircuitOpen),
                Err(error) => {
                    if self.config.circuit_breaker {
                        self.breaker
                            .lock()
                            .expect("breaker lock")
                            .record_failure();
                    }
                    if attempts >= policy.max_attempts {
                        return Err(error);
                    }
                    warn!(attempt = attempts, "gateway attempt failed: {error}");
                    tokio::time::sleep(policy.backoff(attempts)).await;
                }
            }
        }
    }

    /// Ordered streaming pass-through to the provider.
    pub async fn stream(&self, request: ModelRequest) -> Result<ModelStream, GatewayError> {
        self.provider.stream(request).await
    }
}

fn resolve_provider(name: &str) -> Arc<dyn ModelProvider> {
    match name {
        "openai-compat" => Arc::new(OpenAiCompatProvider::from_env()),
        "local-http" => Arc::new(LocalHttpProvider::from_env()),
        _ => Arc::new(MockProvider::default()),
    }
}
