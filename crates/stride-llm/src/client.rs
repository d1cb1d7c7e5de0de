//! Provider-neutral chat client contract.
//!
//! The signature uses genai request/stream types directly: production
//! clients wrap `genai::Client`, test clients build event streams by
//! hand. One client is bound to one model; the per-model cache lives in
//! [`crate::service::LlmService`].

use async_trait::async_trait;
use futures::Stream;
use genai::chat::{ChatOptions, ChatRequest, ChatStreamEvent};
use std::pin::Pin;

/// Stream item type returned by chat clients.
pub type ChatEventStream = Pin<Box<dyn Stream<Item = genai::Result<ChatStreamEvent>> + Send>>;

/// One streaming LLM endpoint bound to a model.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Model this client is bound to.
    fn model_name(&self) -> &str;

    /// Execute one streaming chat call.
    async fn exec_chat_stream_events(
        &self,
        chat_req: ChatRequest,
        options: Option<&ChatOptions>,
    ) -> genai::Result<ChatEventStream>;

    /// Stable client label for debug/telemetry output.
    fn name(&self) -> &'static str {
        "chat_client"
    }
}
