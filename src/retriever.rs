//! Query-time retrieval over the fact index

use crate::config::DEFAULT_TOP_K;
use crate::embedding::Embedder;
use crate::error::RagError;
use crate::index::FactIndex;
use crate::models::ScoredFact;
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// Embeds queries and looks up their nearest facts.
///
/// Cheap to clone; the index is shared read-only.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<FactIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(index: Arc<FactIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &FactIndex {
        &self.index
    }

    /// Fact texts nearest to `query`, closest first
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        Ok(self
            .retrieve_scored(query, top_k)
            .await?
            .into_iter()
            .map(|hit| hit.text)
            .collect())
    }

    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<String>> {
        self.retrieve(query, DEFAULT_TOP_K).await
    }

    pub async fn retrieve_scored(&self, query: &str, top_k: usize) -> Result<Vec<ScoredFact>> {
        if self.index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await.map_err(|e| match e {
            RagError::EmbeddingFailure(_) => e,
            other => RagError::EmbeddingFailure(other.to_string()),
        })?;

        let hits = self.index.search(&query_vector, top_k)?;

        debug!(
            top_k,
            hits = hits.len(),
            nearest = hits.first().map(|h| h.distance),
            "Retrieved facts"
        );

        Ok(hits)
    }
}
