//! Startup wiring shared by the terminal and HTTP front-ends
//!
//! LOAD DATASET → FLATTEN → LOAD OR BUILD INDEX → RETRIEVER → BOUNDED GENERATOR

use crate::config::{EmbedderKind, RagConfig};
use crate::embedding::{Embedder, HashingEmbedder};
use crate::facts::{flatten, Dataset};
use crate::gemini::GeminiClient;
use crate::generation::{BoundedGenerator, Generator};
use crate::index::FactIndex;
use crate::retriever::Retriever;
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// Embedding backend selected by `config.embedder`
pub fn embedder_for(config: &RagConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedder {
        EmbedderKind::Gemini => Ok(Arc::new(GeminiClient::new(config.gemini_api_key.clone())?)),
        EmbedderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(config.hashing_dims))),
    }
}

/// Build the answering pipeline with the given generation backend.
pub async fn build_pipeline(
    config: &RagConfig,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
) -> Result<Arc<BoundedGenerator>> {
    let dataset = Dataset::from_path(&config.data_path)?;
    let facts = flatten(&dataset);
    info!(fact_count = facts.len(), "Dataset flattened");

    let index = FactIndex::load_or_build(&config.index_dir, &facts, embedder.as_ref()).await?;
    info!(
        fact_count = index.len(),
        dims = index.dims(),
        model = %index.model(),
        "Fact index ready"
    );

    let retriever = Retriever::new(Arc::new(index), embedder);
    Ok(Arc::new(BoundedGenerator::from_config(
        retriever, generator, config,
    )))
}

/// Pipeline backed by Gemini for generation
pub async fn build_default_pipeline(config: &RagConfig) -> Result<Arc<BoundedGenerator>> {
    let embedder = embedder_for(config)?;
    let generator: Arc<dyn Generator> =
        Arc::new(GeminiClient::new(config.gemini_api_key.clone())?);
    build_pipeline(config, embedder, generator).await
}
