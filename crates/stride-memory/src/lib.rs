//! Conversation memory with bounded growth.
//!
//! Memory is bounded by character count, measured over the JSON
//! serialization of the combined conversation and agent message lists.
//! When the limit is exceeded, older dialog rounds are summarized by the
//! LLM into a structured snapshot and the memory is rebuilt as
//! `user(snapshot), assistant(ack), recent rounds…`.

pub mod compressor;
pub mod rounds;
pub mod store;

pub use compressor::{MemoryCompressor, COMPRESSION_CONFIRMATION_MESSAGE};
pub use rounds::{flatten_rounds, group_messages_into_rounds, DialogRound};
pub use store::ConversationStore;
