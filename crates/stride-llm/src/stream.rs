//! Streaming response handling: merge partial chunks into a final
//! assistant turn and detect early termination.

use crate::client::ChatEventStream;
use crate::error::LlmError;
use futures::StreamExt;
use genai::chat::{ChatStreamEvent, Usage};
use serde_json::Value;
use std::collections::HashMap;
use stride_contract::{Message, ToolCall};

/// Partial tool call being collected during streaming.
#[derive(Debug, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Collector for streaming LLM responses.
///
/// Processes stream events and accumulates text and tool calls,
/// preserving first-seen tool-call order.
#[derive(Debug, Default)]
pub struct StreamCollector {
    text: String,
    tool_calls: HashMap<String, PartialToolCall>,
    tool_call_order: Vec<String>,
    usage: Option<Usage>,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one stream event.
    pub fn process(&mut self, event: ChatStreamEvent) {
        match event {
            ChatStreamEvent::Chunk(chunk) => {
                if !chunk.content.is_empty() {
                    self.text.push_str(&chunk.content);
                }
            }
            ChatStreamEvent::ToolCallChunk(tool_chunk) => {
                let call_id = tool_chunk.tool_call.call_id.clone();
                let partial = match self.tool_calls.entry(call_id.clone()) {
                    std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                    std::collections::hash_map::Entry::Vacant(e) => {
                        self.tool_call_order.push(call_id.clone());
                        e.insert(PartialToolCall {
                            id: call_id,
                            name: String::new(),
                            arguments: String::new(),
                        })
                    }
                };

                if !tool_chunk.tool_call.fn_name.is_empty() && partial.name.is_empty() {
                    partial.name = tool_chunk.tool_call.fn_name.clone();
                }

                // genai wraps argument strings in Value::String; chunks carry
                // the accumulated value, so replace rather than append.
                let args_str = match &tool_chunk.tool_call.fn_arguments {
                    Value::String(s) if !s.is_empty() => s.clone(),
                    Value::Null | Value::String(_) => String::new(),
                    other => other.to_string(),
                };
                if !args_str.is_empty() {
                    partial.arguments = args_str;
                }
            }
            ChatStreamEvent::End(end) => {
                // The End event is the source of truth for tool calls,
                // overriding partial data accumulated during streaming.
                if let Some(tool_calls) = end.captured_tool_calls() {
                    for tc in tool_calls {
                        let end_args = match &tc.fn_arguments {
                            Value::String(s) if !s.is_empty() => s.clone(),
                            Value::Null | Value::String(_) => String::new(),
                            other => other.to_string(),
                        };
                        match self.tool_calls.entry(tc.call_id.clone()) {
                            std::collections::hash_map::Entry::Occupied(mut e) => {
                                let partial = e.get_mut();
                                if partial.name.is_empty() {
                                    partial.name = tc.fn_name.clone();
                                }
                                if !end_args.is_empty() {
                                    partial.arguments = end_args;
                                }
                            }
                            std::collections::hash_map::Entry::Vacant(e) => {
                                self.tool_call_order.push(tc.call_id.clone());
                                e.insert(PartialToolCall {
                                    id: tc.call_id.clone(),
                                    name: tc.fn_name.clone(),
                                    arguments: end_args,
                                });
                            }
                        }
                    }
                }
                self.usage = end.captured_usage;
            }
            _ => {}
        }
    }

    /// Finish collecting and return the merged outcome.
    pub fn finish(self, input_chars: usize) -> StreamOutcome {
        let mut remaining = self.tool_calls;
        let mut tool_calls: Vec<ToolCall> = Vec::with_capacity(self.tool_call_order.len());

        for call_id in self.tool_call_order {
            let Some(p) = remaining.remove(&call_id) else {
                continue;
            };
            if p.name.is_empty() {
                continue;
            }
            let arguments = serde_json::from_str(&p.arguments).unwrap_or(Value::Null);
            tool_calls.push(ToolCall::new(p.id, p.name, arguments));
        }

        let merged = if tool_calls.is_empty() {
            Message::assistant(self.text.clone())
        } else {
            Message::assistant_with_tool_calls(self.text.clone(), tool_calls.clone())
        };
        let output_chars = serde_json::to_string(&merged)
            .map(|s| s.chars().count())
            .unwrap_or_else(|_| self.text.chars().count());

        StreamOutcome {
            text: self.text,
            tool_calls,
            usage: self.usage,
            input_chars,
            output_chars,
        }
    }
}

/// Merged result of one streaming LLM call.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    /// Character count of the serialized prompt message list.
    pub input_chars: usize,
    /// Character count of the serialized merged assistant turn.
    pub output_chars: usize,
}

impl StreamOutcome {
    /// Early termination: the model produced text but chose no tool.
    pub fn early_terminated(&self) -> bool {
        self.tool_calls.is_empty() && !self.text.is_empty()
    }

    /// The merged assistant turn as a message.
    pub fn assistant_message(&self) -> Message {
        if self.tool_calls.is_empty() {
            Message::assistant(self.text.clone())
        } else {
            Message::assistant_with_tool_calls(self.text.clone(), self.tool_calls.clone())
        }
    }
}

/// Drain a chat event stream into a merged outcome.
pub async fn collect_stream(
    mut stream: ChatEventStream,
    input_chars: usize,
) -> Result<StreamOutcome, LlmError> {
    let mut collector = StreamCollector::new();
    while let Some(event) = stream.next().await {
        let event = event.map_err(|e| LlmError::Stream(e.to_string()))?;
        collector.process(event);
    }
    Ok(collector.finish(input_chars))
}

/// Character count of a message list, measured by JSON serialization so
/// the count matches what is actually sent to the model. Falls back to
/// summed text lengths when serialization fails.
pub fn serialized_char_count(messages: &[Message]) -> usize {
    match serde_json::to_string(messages) {
        Ok(json) => json.chars().count(),
        Err(_) => messages.iter().map(|m| m.content_len()).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genai::chat::{MessageContent, StreamChunk, StreamEnd, ToolChunk};
    use serde_json::json;

    fn tool_chunk(call_id: &str, name: &str, args: &str) -> ChatStreamEvent {
        ChatStreamEvent::ToolCallChunk(ToolChunk {
            tool_call: genai::chat::ToolCall {
                call_id: call_id.to_string(),
                fn_name: name.to_string(),
                fn_arguments: Value::String(args.to_string()),
            },
        })
    }

    #[test]
    fn text_chunks_accumulate() {
        let mut collector = StreamCollector::new();
        collector.process(ChatStreamEvent::Start);
        collector.process(ChatStreamEvent::Chunk(StreamChunk {
            content: "Hello ".to_string(),
        }));
        collector.process(ChatStreamEvent::Chunk(StreamChunk {
            content: "world".to_string(),
        }));
        let outcome = collector.finish(0);
        assert_eq!(outcome.text, "Hello world");
        assert!(outcome.early_terminated());
    }

    #[test]
    fn tool_chunks_merge_in_first_seen_order() {
        let mut collector = StreamCollector::new();
        collector.process(tool_chunk("c2", "beta", r#"{"b":2}"#));
        collector.process(tool_chunk("c1", "alpha", r#"{"a":1}"#));
        let outcome = collector.finish(0);
        assert_eq!(outcome.tool_calls.len(), 2);
        assert_eq!(outcome.tool_calls[0].name, "beta");
        assert_eq!(outcome.tool_calls[1].name, "alpha");
        assert_eq!(outcome.tool_calls[0].arguments, json!({"b": 2}));
        assert!(!outcome.early_terminated());
    }

    #[test]
    fn end_event_overrides_partial_arguments() {
        let mut collector = StreamCollector::new();
        collector.process(tool_chunk("c1", "api", r#"{"partial":true"#));
        let end_tc = genai::chat::ToolCall {
            call_id: "c1".to_string(),
            fn_name: String::new(),
            fn_arguments: Value::String(r#"{"complete":true}"#.to_string()),
        };
        let end = StreamEnd {
            captured_content: Some(MessageContent::from_tool_calls(vec![end_tc])),
            ..Default::default()
        };
        collector.process(ChatStreamEvent::End(end));
        let outcome = collector.finish(0);
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].name, "api");
        assert_eq!(outcome.tool_calls[0].arguments, json!({"complete": true}));
    }

    #[test]
    fn end_event_fills_missing_call() {
        let mut collector = StreamCollector::new();
        let end_tc = genai::chat::ToolCall {
            call_id: "end_call".to_string(),
            fn_name: "finalize".to_string(),
            fn_arguments: Value::String(r#"{"done":true}"#.to_string()),
        };
        let end = StreamEnd {
            captured_content: Some(MessageContent::from_tool_calls(vec![end_tc])),
            ..Default::default()
        };
        collector.process(ChatStreamEvent::End(end));
        let outcome = collector.finish(0);
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].id, "end_call");
    }

    #[test]
    fn output_chars_cover_tool_calls() {
        let mut collector = StreamCollector::new();
        collector.process(tool_chunk("c1", "search", r#"{"q":"rust"}"#));
        let outcome = collector.finish(10);
        assert_eq!(outcome.input_chars, 10);
        assert!(outcome.output_chars > r#"{"q":"rust"}"#.len());
    }

    #[test]
    fn empty_response_is_not_early_termination() {
        let collector = StreamCollector::new();
        let outcome = collector.finish(0);
        assert!(!outcome.early_terminated());
        assert!(outcome.tool_calls.is_empty());
    }

    #[test]
    fn serialized_count_tracks_json_length() {
        let messages = vec![Message::user("abc")];
        let expected = serde_json::to_string(&messages).unwrap().chars().count();
        assert_eq!(serialized_char_count(&messages), expected);
    }

    #[tokio::test]
    async fn collect_stream_drains_events() {
        let events: Vec<genai::Result<ChatStreamEvent>> = vec![
            Ok(ChatStreamEvent::Start),
            Ok(ChatStreamEvent::Chunk(StreamChunk {
                content: "ok".to_string(),
            })),
            Ok(ChatStreamEvent::End(StreamEnd::default())),
        ];
        let stream: ChatEventStream = Box::pin(futures::stream::iter(events));
        let outcome = collect_stream(stream, 5).await.unwrap();
        assert_eq!(outcome.text, "ok");
        assert_eq!(outcome.input_chars, 5);
    }

    #[tokio::test]
    async fn collect_stream_surfaces_errors() {
        let events: Vec<genai::Result<ChatStreamEvent>> = vec![
            Ok(ChatStreamEvent::Start),
            Err(genai::Error::Internal("connection lost".to_string())),
        ];
        let stream: ChatEventStream = Box::pin(futures::stream::iter(events));
        let err = collect_stream(stream, 0).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
