//! Conversation store: ordered message lists keyed by conversation id.
//!
//! All access goes through one async mutex, giving the compressor its
//! single-writer critical section (a write is clear + rewrite of one
//! conversation).

use std::collections::HashMap;
use stride_contract::Message;
use tokio::sync::Mutex;

pub struct ConversationStore {
    inner: Mutex<HashMap<String, Vec<Message>>>,
    /// Max messages retained per conversation before the window trims.
    max_messages: usize,
}

impl ConversationStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_messages: max_messages.max(1),
        }
    }

    pub async fn get(&self, conversation_id: &str) -> Vec<Message> {
        let inner = self.inner.lock().await;
        inner.get(conversation_id).cloned().unwrap_or_default()
    }

    pub async fn append(&self, conversation_id: &str, message: Message) {
        let mut inner = self.inner.lock().await;
        let messages = inner.entry(conversation_id.to_string()).or_default();
        messages.push(message);
        let len = messages.len();
        if len > self.max_messages {
            messages.drain(..len - self.max_messages);
        }
    }

    pub async fn replace(&self, conversation_id: &str, messages: Vec<Message>) {
        let mut inner = self.inner.lock().await;
        inner.insert(conversation_id.to_string(), messages);
    }

    pub async fn clear(&self, conversation_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.remove(conversation_id);
    }
}
