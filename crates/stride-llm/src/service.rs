//! Per-model chat client cache with model-change invalidation.

use crate::client::ChatClient;
use crate::convert::build_request;
use crate::error::LlmError;
use crate::genai_client::GenaiChatClient;
use crate::stream::collect_stream;
use dashmap::DashMap;
use std::sync::Arc;
use stride_contract::{Message, ModelChanged, ModelConfig, ModelRegistry};
use tokio::sync::broadcast;

/// Builds a chat client for a model configuration. Clients are immutable;
/// a configuration change means "remove old, insert new".
pub type ClientFactory = Arc<dyn Fn(&ModelConfig) -> Arc<dyn ChatClient> + Send + Sync>;

/// Chat client lookup with a concurrent per-model cache.
pub struct LlmService {
    registry: Arc<dyn ModelRegistry>,
    factory: ClientFactory,
    cache: DashMap<String, Arc<dyn ChatClient>>,
}

impl LlmService {
    pub fn new(registry: Arc<dyn ModelRegistry>, factory: ClientFactory) -> Self {
        Self {
            registry,
            factory,
            cache: DashMap::new(),
        }
    }

    /// Service backed by genai clients.
    pub fn genai(registry: Arc<dyn ModelRegistry>) -> Self {
        Self::new(
            registry,
            Arc::new(|config| Arc::new(GenaiChatClient::from_config(config)) as Arc<dyn ChatClient>),
        )
    }

    /// Client for the default model.
    pub fn default_client(&self) -> Result<Arc<dyn ChatClient>, LlmError> {
        self.client_for(None)
    }

    /// Client for an optional model-name override. `None` or an empty name
    /// resolves the registry default.
    pub fn client_for(&self, model_name: Option<&str>) -> Result<Arc<dyn ChatClient>, LlmError> {
        let config = match model_name.filter(|n| !n.is_empty()) {
            Some(name) => self
                .registry
                .find_by_name(name)
                .ok_or_else(|| LlmError::ModelNotConfigured(name.to_string()))?,
            None => self
                .registry
                .find_default()
                .ok_or_else(|| LlmError::ModelNotConfigured("default".to_string()))?,
        };

        if let Some(cached) = self.cache.get(&config.name) {
            tracing::debug!(model = %config.name, "using cached chat client");
            return Ok(cached.value().clone());
        }

        let client = (self.factory)(&config);
        self.cache.insert(config.name.clone(), client.clone());
        tracing::info!(model = %config.name, "built and cached chat client");
        Ok(client)
    }

    /// Purge the cache and rebuild the changed model's client.
    pub fn on_model_changed(&self, event: &ModelChanged) {
        self.cache.clear();
        let client = (self.factory)(&event.config);
        self.cache.insert(event.config.name.clone(), client);
        tracing::info!(model = %event.config.name, "rebuilt chat client after model change");
    }

    /// Subscribe to a model-change event channel for the service lifetime.
    pub fn spawn_model_change_listener(
        self: &Arc<Self>,
        mut rx: broadcast::Receiver<ModelChanged>,
    ) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                service.on_model_changed(&event);
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn cached_models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.cache.iter().map(|e| e.key().clone()).collect();
        models.sort();
        models
    }
}

/// One non-tool call collecting the streamed text. Used by summary
/// generation paths.
pub async fn chat_text(client: &dyn ChatClient, messages: &[Message]) -> Result<String, LlmError> {
    let request = build_request(messages, &[]);
    let stream = client
        .exec_chat_stream_events(request, None)
        .await
        .map_err(|e| LlmError::Call(e.to_string()))?;
    let outcome = collect_stream(stream, 0).await?;
    Ok(outcome.text)
}
