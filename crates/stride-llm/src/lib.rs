//! LLM access for the stride runtime.
//!
//! The loop talks to models through the [`ChatClient`] trait: genai
//! request/stream types in the signature, so the production client is a
//! thin wrapper over `genai::Client` and tests script the model by
//! building stream events directly. Internal tool execution stays
//! disabled; the core drives the tool loop itself.

pub mod client;
pub mod convert;
pub mod error;
pub mod genai_client;
pub mod service;
pub mod stream;
pub mod testing;

pub use client::{ChatClient, ChatEventStream};
pub use convert::{build_request, to_chat_message, to_genai_tool};
pub use error::{is_retryable_llm_error, LlmError};
pub use genai_client::GenaiChatClient;
pub use service::{chat_text, ClientFactory, LlmService};
pub use stream::{collect_stream, serialized_char_count, StreamCollector, StreamOutcome};
