//! Error types for the financial RAG assistant

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {

    // =============================
    // Index Errors
    // =============================

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("Cannot build an index over an empty fact set")]
    EmptyCorpus,

    // =============================
    // Service Errors
    // =============================

    #[error("Embedding error: {0}")]
    EmbeddingFailure(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Generation timed out after {0} ms")]
    GenerationTimeout(u64),

    #[error("Generation error: {0}")]
    GenerationFailure(String),

    // =============================
    // Conversation Errors
    // =============================

    #[error("Conversation is already awaiting an answer")]
    ConversationBusy,

    #[error("Conversation has no pending turn")]
    NoPendingTurn,

    // =============================
    // Input Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl RagError {
    /// Missing and corrupt indexes are both recovered by rebuilding.
    pub fn is_recoverable_index_error(&self) -> bool {
        matches!(self, RagError::IndexNotFound(_) | RagError::IndexCorrupt(_))
    }
}
