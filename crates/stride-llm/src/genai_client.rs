//! genai-backed [`ChatClient`] implementation.

use crate::client::{ChatClient, ChatEventStream};
use async_trait::async_trait;
use genai::chat::{ChatOptions, ChatRequest};
use genai::Client;
use stride_contract::ModelConfig;

/// Production chat client over `genai::Client`, bound to one model.
///
/// genai never executes tools on its own; the catalog in the request only
/// describes them, and the loop runs every call itself.
pub struct GenaiChatClient {
    client: Client,
    model: String,
    options: Option<ChatOptions>,
}

impl GenaiChatClient {
    /// Build a client from a registry model configuration.
    pub fn from_config(config: &ModelConfig) -> Self {
        let client = Client::default();
        let options = config
            .temperature
            .map(|t| ChatOptions::default().with_temperature(t));
        Self {
            client,
            model: config.name.clone(),
            options,
        }
    }

    pub fn new(client: Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            options: None,
        }
    }
}

#[async_trait]
impl ChatClient for GenaiChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn exec_chat_stream_events(
        &self,
        chat_req: ChatRequest,
        options: Option<&ChatOptions>,
    ) -> genai::Result<ChatEventStream> {
        let options = options.or(self.options.as_ref());
        let response = self
            .client
            .exec_chat_stream(&self.model, chat_req, options)
            .await?;
        Ok(Box::pin(response.stream))
    }

    fn name(&self) -> &'static str {
        "genai"
    }
}
