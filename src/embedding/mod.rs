//! Embedding service abstraction
//!
//! The index and the retriever only see the [`Embedder`] trait. Concrete
//! backends: the Gemini REST client ([`crate::gemini::GeminiClient`]) and the
//! deterministic [`HashingEmbedder`] used offline and in tests.

use crate::error::RagError;
use crate::Result;
use async_trait::async_trait;

pub mod hashing;
pub use hashing::HashingEmbedder;

/// Turns text into fixed-dimension vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, recorded next to a persisted index
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts; output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Check a batch result: one vector per input, all of the same non-zero dimension.
///
/// Returns the shared dimension.
pub fn validate_batch(vectors: &[Vec<f32>], expected_len: usize) -> Result<usize> {
    if vectors.len() != expected_len {
        return Err(RagError::EmbeddingFailure(format!(
            "embedding service returned {} vectors for {} inputs",
            vectors.len(),
            expected_len
        )));
    }

    let dims = match vectors.first() {
        Some(first) => first.len(),
        None => return Ok(0),
    };

    if dims == 0 {
        return Err(RagError::EmbeddingFailure(
            "embedding service returned an empty vector".to_string(),
        ));
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(RagError::DimensionMismatch {
            expected: dims,
            actual: bad.len(),
        });
    }

    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(RagError::EmbeddingFailure(
            "embedding contains non-finite values".to_string(),
        ));
    }

    Ok(dims)
}
