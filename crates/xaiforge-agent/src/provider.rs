//! Task provider contract and catalog
//!
//! A provider turns a task string into an ordered sequence of events pushed
//! through the sink, and returns the final answer. The catalog is passed to
//! the runner by constructor rather than consulted as a global.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use xaiforge_tools::{ToolContext, ToolDispatch};

use crate::pipeline::{EmitError, EventSink};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{0}")]
    Provider(String),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl ProviderError {
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }
}

#[async_trait::async_trait]
pub trait TaskProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Run the task, emitting events through the sink. Returns the final
    /// answer text.
    async fn run(
        &self,
        task: &str,
        tools: &dyn ToolDispatch,
        ctx: &ToolContext,
        sink: &mut dyn EventSink,
    ) -> Result<String, ProviderError>;
}

pub struct ProviderCatalog {
    providers: HashMap<String, Arc<dyn TaskProvider>>,
}

impl ProviderCatalog {
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// The built-in providers: heuristic, ollama, openai_compat.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.register(Arc::new(crate::heuristic::HeuristicProvider));
        catalog.register(Arc::new(crate::ollama::OllamaProvider::default()));
        catalog.register(Arc::new(crate::openai_compat::OpenAiCompatProvider::default()));
        catalog
    }

    pub fn register(&mut self, provider: Arc<dyn TaskProvider>) {
        self.providers
            .insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
