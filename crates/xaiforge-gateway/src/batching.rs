//! Request batching - a single-consumer scheduler that coalesces requests
//!
//! The worker pulls the first pending request, waits up to `max_wait_ms`,
//! drains whatever else is queued (up to `max_batch_size`), and invokes the
//! provider's batch entry point. Responses are matched back to their
//! waiters by position.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::models::{GatewayError, ModelProvider, ModelRequest, ModelResponse};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "BatchConfig::default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "BatchConfig::default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_batch_size: Self::default_max_batch_size(),
            max_wait_ms: Self::default_max_wait_ms(),
        }
    }
}

impl BatchConfig {
    fn default_max_batch_size() -> usize {
        4
    }
    fn default_max_wait_ms() -> u64 {
        25
    }
}

type Waiter = oneshot::Sender<Result<ModelResponse, GatewayError>>;

pub struct BatchScheduler {
    queue: mpsc::UnboundedSender<(ModelRequest, Waiter)>,
}

impl BatchScheduler {
    /// Spawn the consumer task. Must be called from within a runtime.
    pub fn start(provider: Arc<dyn ModelProvider>, config: BatchConfig) -> Self {
        let (queue, mut rx) = mpsc::unbounded_channel::<(ModelRequest, Waiter)>();
        tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                let mut batch = vec![first];
                if config.max_wait_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(config.max_wait_ms)).await;
                }
                while batch.len() < config.max_batch_size {
                    match rx.try_recv() {
                        Ok(item) => batch.push(item),
                        Err(_) => break,
                    }
                }
                debug!(size = batch.len(), "dispatching request batch");
                let requests: Vec<ModelRequest> =
                    batch.iter().map(|(request, _)| request.clone()).collect();
                match provider.generate_batch(requests).await {
                    Ok(responses) => {
                        let mut responses = responses.into_iter();
                        for (_, waiter) in batch {
                            let outcome = responses.next().ok_or_else(|| {
                                GatewayError::InvalidResponse(
                                    "batch returned fewer responses than requests".to_string(),
                                )
                            });
                            let _ = waiter.send(outcome);
                        }
                    }
                    Err(error) => {
                        let message = error.to_string();
                        for (_, waiter) in batch {
                            let _ = waiter.send(Err(GatewayError::Provider(message.clone())));
                        }
                    }
                }
            }
        });
        Self { queue }
    }

    pub async fn submit(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError> {
        let (tx, rx) = oneshot::channel();
        self.queue
            .send((request, tx))
            .map_err(|_| GatewayError::BatchClosed)?;
        rx.await.map_err(|_| GatewayError::BatchClosed)?
    }
}
