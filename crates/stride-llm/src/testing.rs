//! Scripted chat clients for tests.
//!
//! A scripted client replays configured responses in order, building the
//! same genai stream events a live provider would emit. When the script
//! is exhausted it answers with a plain text turn.

use crate::client::{ChatClient, ChatEventStream};
use async_trait::async_trait;
use genai::chat::{
    ChatOptions, ChatRequest, ChatStreamEvent, StreamChunk, StreamEnd, ToolChunk,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One scripted model turn.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    text: String,
    tool_calls: Vec<(String, String, Value)>,
    error: Option<String>,
}

impl ScriptedResponse {
    /// Text-only turn (an early termination when tools were expected).
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            error: None,
        }
    }

    /// Failing turn: the stream does not start.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            tool_calls: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// Add a tool call to this turn.
    #[must_use]
    pub fn with_tool_call(
        mut self,
        call_id: impl Into<String>,
        name: impl Into<String>,
        args: Value,
    ) -> Self {
        self.tool_calls
            .push((call_id.into(), name.into(), args));
        self
    }

    fn events(&self) -> Vec<genai::Result<ChatStreamEvent>> {
        let mut events: Vec<genai::Result<ChatStreamEvent>> = vec![Ok(ChatStreamEvent::Start)];
        if !self.text.is_empty() {
            events.push(Ok(ChatStreamEvent::Chunk(StreamChunk {
                content: self.text.clone(),
            })));
        }
        for (call_id, name, args) in &self.tool_calls {
            events.push(Ok(ChatStreamEvent::ToolCallChunk(ToolChunk {
                tool_call: genai::chat::ToolCall {
                    call_id: call_id.clone(),
                    fn_name: name.clone(),
                    fn_arguments: Value::String(args.to_string()),
                },
            })));
        }
        events.push(Ok(ChatStreamEvent::End(StreamEnd::default())));
        events
    }
}

/// Chat client replaying scripted responses in order.
pub struct ScriptedChatClient {
    model: String,
    responses: Mutex<VecDeque<ScriptedResponse>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatClient {
    pub fn new(model: impl Into<String>, responses: Vec<ScriptedResponse>) -> Self {
        Self {
            model: model.into(),
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of chat calls issued so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests seen, for prompt assertions.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Append further scripted turns.
    pub fn push_response(&self, response: ScriptedResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn exec_chat_stream_events(
        &self,
        chat_req: ChatRequest,
        _options: Option<&ChatOptions>,
    ) -> genai::Result<ChatEventStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(chat_req);
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| ScriptedResponse::text("done"));
        if let Some(message) = next.error {
            return Err(genai::Error::Internal(message));
        }
        Ok(Box::pin(futures::stream::iter(next.events())))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
