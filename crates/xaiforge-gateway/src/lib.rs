//! Xaiforge Gateway - reliability wrapper around model providers
//!
//! Wraps a provider with per-call timeouts, retry with jittered exponential
//! backoff, an optional circuit breaker, and an optional request batcher.

pub mod batching;
pub mod config;
pub mod gateway;
pub mod models;
pub mod providers;
pub mod reliability;

pub use batching::{BatchConfig, BatchScheduler};
pub use config::{load_gateway_config, GatewayConfig};
pub use gateway::{GatewayResult, ModelGateway};
pub use models::{
    ChatRole, GatewayError, ModelMessage, ModelProvider, ModelRequest, ModelResponse, ModelStream,
    StreamChunk, StreamEvent, ToolCall, ToolDefinition, UsageInfo,
};
pub use providers::{LocalHttpProvider, MockProvider, OpenAiCompatProvider};
pub use reliability::{CircuitBreaker, RetryPolicy};
