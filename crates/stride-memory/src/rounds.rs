//! Dialog round grouping.
//!
//! A round is a maximal contiguous message run shaped
//! `user → assistant → tool`, `user → assistant`, or `assistant → tool`.
//! Rounds are derived on demand and never stored.

use stride_contract::{Message, Role};

/// One dialog round.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogRound {
    pub messages: Vec<Message>,
}

impl DialogRound {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn has_user(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }

    /// Character count of the round's visible text (not serialized JSON).
    pub fn total_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content_len()).sum()
    }
}

/// Greedily scan messages left-to-right, closing a round on any tool
/// response and otherwise starting a new round at each user message.
/// Unknown message types attach to the current open round.
pub fn group_messages_into_rounds(messages: &[Message]) -> Vec<DialogRound> {
    let mut rounds = Vec::new();
    let mut current: Option<DialogRound> = None;

    for message in messages {
        match message.role {
            Role::User => {
                if let Some(round) = current.take() {
                    rounds.push(round);
                }
                let mut round = DialogRound::new();
                round.push(message.clone());
                current = Some(round);
            }
            Role::Assistant => {
                let extends_user_round = current.as_ref().map(DialogRound::has_user).unwrap_or(false);
                if extends_user_round {
                    if let Some(round) = current.as_mut() {
                        round.push(message.clone());
                    }
                } else {
                    // Open round without a user turn: close it and start a
                    // fresh assistant-led round (agent memory shape).
                    if let Some(round) = current.take() {
                        rounds.push(round);
                    }
                    let mut round = DialogRound::new();
                    round.push(message.clone());
                    current = Some(round);
                }
            }
            Role::Tool => {
                let mut round = current.take().unwrap_or_else(DialogRound::new);
                round.push(message.clone());
                rounds.push(round);
            }
            Role::System => {
                if let Some(round) = current.as_mut() {
                    round.push(message.clone());
                }
            }
        }
    }

    if let Some(round) = current.take() {
        rounds.push(round);
    }

    rounds
}

/// Flatten rounds back into a message list, oldest first.
pub fn flatten_rounds(rounds: &[DialogRound]) -> Vec<Message> {
    rounds
        .iter()
        .flat_map(|r| r.messages.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_contract::ToolCall;

    fn assistant_call(content: &str, call_id: &str) -> Message {
        Message::assistant_with_tool_calls(
            content,
            vec![ToolCall::new(call_id, "echo", serde_json::json!({}))],
        )
    }

    #[test]
    fn user_assistant_tool_forms_one_round() {
        let messages = vec![
            Message::user("q"),
            assistant_call("calling", "c1"),
            Message::tool("c1", "result"),
        ];
        let rounds = group_messages_into_rounds(&messages);
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].messages.len(), 3);
    }

    #[test]
    fn user_assistant_without_tool_is_a_round() {
        let messages = vec![
            Message::user("q1"),
            Message::assistant("a1"),
            Message::user("q2"),
            Message::assistant("a2"),
        ];
        let rounds = group_messages_into_rounds(&messages);
        assert_eq!(rounds.len(), 2);
        assert!(rounds.iter().all(|r| r.messages.len() == 2));
    }

    #[test]
    fn assistant_tool_pairs_group_as_agent_memory_rounds() {
        let messages = vec![
            assistant_call("one", "c1"),
            Message::tool("c1", "r1"),
            assistant_call("two", "c2"),
            Message::tool("c2", "r2"),
        ];
        let rounds = group_messages_into_rounds(&messages);
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[1].messages[0].content, "two");
    }

    #[test]
    fn consecutive_assistants_split_rounds() {
        let messages = vec![Message::assistant("a1"), Message::assistant("a2")];
        let rounds = group_messages_into_rounds(&messages);
        assert_eq!(rounds.len(), 2);
    }

    #[test]
    fn tool_without_open_round_forms_its_own() {
        let messages = vec![Message::tool("c1", "orphan")];
        let rounds = group_messages_into_rounds(&messages);
        assert_eq!(rounds.len(), 1);
    }

    #[test]
    fn system_messages_attach_to_open_round() {
        let messages = vec![
            Message::user("q"),
            Message::system("note"),
            Message::assistant("a"),
        ];
        let rounds = group_messages_into_rounds(&messages);
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].messages.len(), 3);
    }

    #[test]
    fn grouping_flatten_roundtrip() {
        let messages = vec![
            Message::user("q"),
            assistant_call("a", "c1"),
            Message::tool("c1", "r"),
            Message::user("q2"),
            Message::assistant("a2"),
        ];
        let rounds = group_messages_into_rounds(&messages);
        let flat = flatten_rounds(&rounds);
        assert_eq!(flat, messages);
        assert_eq!(group_messages_into_rounds(&flat), rounds);
    }

    #[test]
    fn total_chars_counts_text_only() {
        let round = DialogRound {
            messages: vec![Message::user("abcd"), Message::assistant("ef")],
        };
        assert_eq!(round.total_chars(), 6);
    }
}
