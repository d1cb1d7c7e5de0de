//! Adaptive memory compression.
//!
//! Older dialog rounds are summarized by the LLM into a `<state_snapshot>`
//! XML block stored as a user message, followed by a canned assistant
//! acknowledgement so the rebuilt memory keeps strict user/assistant
//! alternation for downstream models. Roughly 40% of characters survive
//! as recent rounds; the newest round is always kept.

use crate::rounds::{flatten_rounds, group_messages_into_rounds, DialogRound};
use crate::store::ConversationStore;
use std::sync::Arc;
use stride_contract::{Message, Role, StrideConfig};
use stride_llm::{chat_text, serialized_char_count, LlmService};

/// Canned assistant reply appended after every snapshot message.
pub const COMPRESSION_CONFIRMATION_MESSAGE: &str = "Got it. Thanks for the additional context!";

pub struct MemoryCompressor {
    store: Arc<ConversationStore>,
    llm: Arc<LlmService>,
    config: StrideConfig,
}

impl MemoryCompressor {
    pub fn new(store: Arc<ConversationStore>, llm: Arc<LlmService>, config: StrideConfig) -> Self {
        Self { store, llm, config }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Character count of a message list, measured by JSON serialization.
    pub fn calculate_total_characters(&self, messages: &[Message]) -> usize {
        serialized_char_count(messages)
    }

    pub fn max_character_count(&self) -> usize {
        self.config.conversation_memory_max_chars
    }

    /// Compress a conversation when its serialized size exceeds the limit.
    pub async fn check_and_limit(&self, conversation_id: &str) {
        if conversation_id.trim().is_empty() {
            return;
        }
        let messages = self.store.get(conversation_id).await;
        if messages.is_empty() {
            return;
        }
        let total = self.calculate_total_characters(&messages);
        let max = self.max_character_count();
        if total <= max {
            tracing::debug!(
                conversation_id,
                total,
                max,
                "conversation memory within limit"
            );
            return;
        }
        tracing::info!(
            conversation_id,
            total,
            max,
            "conversation memory exceeds limit, summarizing older rounds"
        );
        self.force_compress_conversation(conversation_id).await;
    }

    /// Append a message to a conversation and compress if the addition
    /// pushed it over the limit.
    pub async fn append_and_limit(&self, conversation_id: &str, message: Message) {
        if conversation_id.trim().is_empty() {
            return;
        }
        self.store.append(conversation_id, message).await;
        self.check_and_limit(conversation_id).await;
    }

    /// Compress a conversation regardless of its size.
    pub async fn force_compress_conversation(&self, conversation_id: &str) {
        if conversation_id.trim().is_empty() {
            return;
        }
        let messages = self.store.get(conversation_id).await;
        if messages.is_empty() {
            return;
        }
        if let Some(compressed) = self.compress_messages(&messages).await {
            self.store.replace(conversation_id, compressed).await;
        }
    }

    /// Compress agent memory in place, returning the rebuilt list.
    ///
    /// Already-compressed memory that is under the threshold passes
    /// through unchanged, so repeated forced compression is idempotent
    /// until new rounds accumulate.
    pub async fn force_compress_agent_memory(&self, messages: Vec<Message>) -> Vec<Message> {
        if messages.is_empty() {
            return messages;
        }
        if is_compressed_shape(&messages)
            && self.calculate_total_characters(&messages) <= self.max_character_count()
        {
            return messages;
        }
        tracing::info!(
            count = messages.len(),
            "force compressing agent memory to break potential loop"
        );
        match self.compress_messages(&messages).await {
            Some(compressed) => compressed,
            None => messages,
        }
    }

    /// Check the combined conversation + agent size against the limit and
    /// force-compress both when exceeded. Returns the (possibly new)
    /// agent message list. The conversation snapshot and the agent
    /// snapshot are produced independently, conversation first.
    pub async fn check_and_compress_if_needed(
        &self,
        conversation_id: Option<&str>,
        agent_messages: Vec<Message>,
    ) -> Vec<Message> {
        let conversation_messages = match conversation_id {
            Some(id) if !id.trim().is_empty() => self.store.get(id).await,
            _ => Vec::new(),
        };

        let mut all = conversation_messages.clone();
        all.extend(agent_messages.iter().cloned());
        let total = self.calculate_total_characters(&all);
        let max = self.max_character_count();
        if total <= max {
            tracing::debug!(total, max, "combined memory within limit");
            return agent_messages;
        }

        tracing::info!(
            total,
            max,
            "combined memory exceeds limit, force compressing conversation and agent memory"
        );

        if let Some(id) = conversation_id {
            if !conversation_messages.is_empty() {
                self.force_compress_conversation(id).await;
            }
        }

        if agent_messages.is_empty() {
            agent_messages
        } else {
            self.force_compress_agent_memory(agent_messages).await
        }
    }

    /// Round-select and summarize. Returns `None` when nothing changes.
    async fn compress_messages(&self, messages: &[Message]) -> Option<Vec<Message>> {
        let rounds = group_messages_into_rounds(messages);
        if rounds.is_empty() {
            return None;
        }

        let total_chars: usize = rounds.iter().map(DialogRound::total_chars).sum();
        let target = (total_chars as f64 * self.config.retention_ratio) as usize;
        if total_chars == 0 || target == 0 {
            tracing::debug!(total_chars, "memory too small, keeping all rounds");
            return None;
        }

        let split = retention_split(&rounds, target);
        if split == 0 {
            return None;
        }

        let summary = self.summarize_rounds(&rounds[..split]).await;
        let kept = &rounds[split..];

        let mut rebuilt = Vec::with_capacity(2 + kept.iter().map(|r| r.messages.len()).sum::<usize>());
        rebuilt.push(summary);
        rebuilt.push(Message::assistant(COMPRESSION_CONFIRMATION_MESSAGE));
        rebuilt.extend(flatten_rounds(kept));

        let kept_chars: usize = kept.iter().map(DialogRound::total_chars).sum();
        tracing::info!(
            kept_rounds = kept.len(),
            kept_chars,
            summarized_rounds = split,
            retention = format!(
                "{:.1}%",
                if total_chars > 0 {
                    kept_chars as f64 / total_chars as f64 * 100.0
                } else {
                    0.0
                }
            ),
            "memory compression completed"
        );

        Some(rebuilt)
    }

    /// Summarize rounds into a snapshot user message within the size band.
    async fn summarize_rounds(&self, rounds: &[DialogRound]) -> Message {
        let all_messages = flatten_rounds(rounds);
        let history = match serde_json::to_string(&all_messages) {
            Ok(json) => json,
            Err(_) => role_tagged_history(&all_messages),
        };

        let prompt = summary_prompt(
            self.config.summary_min_chars,
            self.config.summary_max_chars,
            &history,
        );

        let client = match self.llm.default_client() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "no LLM client for summarization, using fallback summary");
                return fallback_summary(rounds.len());
            }
        };

        let request = vec![
            Message::system(
                "You are a helpful assistant that creates structured state_snapshot summaries. \
                 Always output valid XML in the exact format requested.",
            ),
            Message::user(prompt),
        ];

        let mut summary = match chat_text(client.as_ref(), &request).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "summarization call failed, using fallback summary");
                return fallback_summary(rounds.len());
            }
        };

        let len = summary.chars().count();
        if len < self.config.summary_min_chars {
            tracing::warn!(len, "generated summary is under the size band, using as-is");
        } else if len > self.config.summary_max_chars {
            tracing::warn!(len, "generated summary exceeds the size band, truncating");
            summary = summary.chars().take(self.config.summary_max_chars).collect();
        }

        Message::user(summary)
    }
}

/// Index of the first kept round: walk from newest to oldest accumulating
/// characters; the newest round is unconditionally kept, and the first
/// older round that would exceed the target sends all remaining older
/// rounds to summarization.
fn retention_split(rounds: &[DialogRound], target_chars: usize) -> usize {
    let mut accumulated = 0usize;
    for i in (0..rounds.len()).rev() {
        let chars = rounds[i].total_chars();
        if i == rounds.len() - 1 {
            accumulated += chars;
            continue;
        }
        if accumulated + chars <= target_chars {
            accumulated += chars;
        } else {
            return i + 1;
        }
    }
    0
}

/// Memory already shaped `user(snapshot), assistant(ack), …`.
fn is_compressed_shape(messages: &[Message]) -> bool {
    messages.len() >= 2
        && messages[0].role == Role::User
        && messages[1].role == Role::Assistant
        && messages[1].content == COMPRESSION_CONFIRMATION_MESSAGE
}

fn fallback_summary(round_count: usize) -> Message {
    Message::user(format!(
        "Previous conversation history ({round_count} dialog rounds) has been summarized due to length constraints."
    ))
}

fn role_tagged_history(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let tag = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool Response",
            Role::System => "System",
        };
        out.push_str(tag);
        out.push_str(": ");
        out.push_str(&message.content);
        out.push_str("\n\n");
    }
    out
}

fn summary_prompt(min_chars: usize, max_chars: usize, history: &str) -> String {
    format!(
        r#"First, reason in your scratchpad. Then, generate the <state_snapshot>.

Analyze the following conversation history and create a structured state_snapshot XML.
The state_snapshot should be between {min_chars} and {max_chars} characters total.

Required XML structure:
<state_snapshot>
<overall_goal>
[The main objective or goal of the conversation]
</overall_goal>
<key_knowledge>
[Important facts, commands, configurations, URLs, file paths, and key information discovered]
</key_knowledge>
<file_system_state>
[Files that were created, modified, deleted, or accessed (use prefixes: CREATED, MODIFIED, DELETED, ACCESSED)]
</file_system_state>
<recent_actions>
[Recent tool calls, commands executed, searches performed, and actions taken]
</recent_actions>
<current_plan>
[Current plan items with status: [DONE], [IN PROGRESS], [PENDING]]
</current_plan>
</state_snapshot>

Guidelines:
- Preserve all critical information: URLs, file paths, commands, configurations
- Include tool names and their results when relevant
- Track file system changes accurately
- Maintain plan status and progress
- Keep the total length between {min_chars} and {max_chars} characters
- Output the XML content directly, no additional text before or after

Conversation history:
{history}
"#
    )
}
