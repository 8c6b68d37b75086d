//! Financial RAG Assistant
//!
//! A retrieval-augmented question answering assistant over a tabular
//! financial dataset:
//! - Flattens each table cell into a natural-language fact sentence
//! - Embeds facts into an exact L2 index persisted next to an id map
//! - Retrieves the nearest facts for each question
//! - Screens questions through a moderation denylist
//! - Generates answers under a hard deadline with real cancellation
//! - Tracks each conversation as an explicit state machine
//!
//! ANSWER LOOP:
//! SUBMIT → MODERATE → RETRIEVE → GENERATE (bounded) → POST-PROCESS → RESOLVE

pub mod api;
pub mod app;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod facts;
pub mod gemini;
pub mod generation;
pub mod index;
pub mod models;
pub mod moderation;
pub mod retriever;
pub mod testing;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use config::RagConfig;
pub use conversation::{ChatSession, Conversation, ConversationEvent, ConversationState};
pub use generation::BoundedGenerator;
pub use index::FactIndex;
pub use moderation::ModerationGate;
pub use retriever::Retriever;
