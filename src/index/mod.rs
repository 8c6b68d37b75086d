//! Fact index: embeddings + id→fact mapping, with on-disk persistence
//!
//! Two artifacts live side by side in the index directory:
//! - `financial_facts.index`: the binary [`FlatL2Index`]
//! - `index_map.json`: the id→fact mapping plus metadata that ties it to
//!   exactly one index file (dims, count, checksum of the index bytes)
//!
//! Both are written to temp files first and renamed into place, so a reader
//! never observes a half-written artifact. A pair that does not belong
//! together is reported as [`RagError::IndexCorrupt`].

use crate::embedding::{validate_batch, Embedder};
use crate::error::RagError;
use crate::models::{Fact, ScoredFact};
use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub mod flat;
pub use flat::FlatL2Index;

pub const INDEX_FILE: &str = "financial_facts.index";
pub const MAP_FILE: &str = "index_map.json";

/// Persisted side mapping
#[derive(Debug, Serialize, Deserialize)]
struct IndexMap {
    model: String,
    dims: usize,
    count: usize,
    fingerprint: String,
    index_sha256: String,
    facts: BTreeMap<usize, String>,
}

/// Read-only after build/load; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct FactIndex {
    vectors: FlatL2Index,
    facts: Vec<String>,
    model: String,
    fingerprint: String,
}

impl FactIndex {
    /// Embed every fact and build an exact L2 index over the vectors.
    pub async fn build(facts: &[Fact], embedder: &dyn Embedder) -> Result<Self> {
        if facts.is_empty() {
            return Err(RagError::EmptyCorpus);
        }

        if let Some(fact) = facts.iter().enumerate().find(|(pos, f)| f.id != *pos) {
            return Err(RagError::Dataset(format!(
                "fact ids must be dense from 0, found id {} at position {}",
                fact.1.id, fact.0
            )));
        }

        let texts: Vec<String> = facts.iter().map(|f| f.text.clone()).collect();

        info!(
            fact_count = texts.len(),
            model = embedder.model_name(),
            "Building fact index"
        );

        let vectors = embedder.embed_batch(&texts).await.map_err(into_embedding_failure)?;
        let dims = validate_batch(&vectors, texts.len())?;

        let mut index = FlatL2Index::new(dims);
        index.add(&vectors)?;

        info!(fact_count = index.len(), dims, "Fact index built");

        Ok(Self {
            vectors: index,
            fingerprint: fingerprint(facts),
            facts: texts,
            model: embedder.model_name().to_string(),
        })
    }

    /// Load a persisted index. Missing artifacts → `IndexNotFound`,
    /// unreadable or mismatched artifacts → `IndexCorrupt`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let index_path = dir.join(INDEX_FILE);
        let map_path = dir.join(MAP_FILE);

        let index_bytes = read_artifact(&index_path)?;
        let map_bytes = read_artifact(&map_path)?;

        let map: IndexMap = serde_json::from_slice(&map_bytes)
            .map_err(|e| RagError::IndexCorrupt(format!("unreadable mapping: {}", e)))?;

        if sha256_hex(&index_bytes) != map.index_sha256 {
            return Err(RagError::IndexCorrupt(
                "index file does not match its mapping".to_string(),
            ));
        }

        let vectors = FlatL2Index::from_bytes(&index_bytes)?;

        if vectors.dims() != map.dims || vectors.len() != map.count {
            return Err(RagError::IndexCorrupt(format!(
                "mapping expects {} vectors of dim {}, index has {} of dim {}",
                map.count,
                map.dims,
                vectors.len(),
                vectors.dims()
            )));
        }

        if map.facts.len() != map.count || !map.facts.keys().copied().eq(0..map.count) {
            return Err(RagError::IndexCorrupt(
                "mapping ids are not dense over the index".to_string(),
            ));
        }

        info!(
            path = %dir.display(),
            fact_count = map.count,
            dims = map.dims,
            "Index loaded successfully"
        );

        Ok(Self {
            vectors,
            facts: map.facts.into_values().collect(),
            model: map.model,
            fingerprint: map.fingerprint,
        })
    }

    /// Atomically write both artifacts into `dir`
    pub fn persist(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let index_bytes = self.vectors.to_bytes();
        let map = IndexMap {
            model: self.model.clone(),
            dims: self.vectors.dims(),
            count: self.vectors.len(),
            fingerprint: self.fingerprint.clone(),
            index_sha256: sha256_hex(&index_bytes),
            facts: self.facts.iter().cloned().enumerate().collect(),
        };
        let map_bytes = serde_json::to_vec_pretty(&map)?;

        let index_tmp = write_temp(dir, INDEX_FILE, &index_bytes)?;
        let map_tmp = write_temp(dir, MAP_FILE, &map_bytes)?;

        index_tmp
            .persist(dir.join(INDEX_FILE))
            .map_err(|e| RagError::IoError(e.error))?;
        map_tmp
            .persist(dir.join(MAP_FILE))
            .map_err(|e| RagError::IoError(e.error))?;

        info!(path = %dir.display(), fact_count = self.len(), "Index persisted");
        Ok(())
    }

    /// Index with no facts; every search returns nothing.
    pub fn empty(model: impl Into<String>) -> Self {
        Self {
            vectors: FlatL2Index::new(0),
            facts: Vec::new(),
            model: model.into(),
            fingerprint: fingerprint(&[]),
        }
    }

    /// Startup sequence: reuse a matching persisted index, otherwise build
    /// and persist a fresh one. Only embedding failures abort.
    ///
    /// An empty fact set yields an in-memory [`FactIndex::empty`] and leaves
    /// the index directory untouched.
    pub async fn load_or_build(
        dir: impl AsRef<Path>,
        facts: &[Fact],
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let dir = dir.as_ref();

        if facts.is_empty() {
            warn!("No facts to index, serving an empty index");
            return Ok(Self::empty(embedder.model_name()));
        }

        match Self::load(dir) {
            Ok(index)
                if index.fingerprint == fingerprint(facts)
                    && index.model == embedder.model_name() =>
            {
                return Ok(index);
            }
            Ok(_) => {
                info!("Persisted index is stale for the current facts, rebuilding");
            }
            Err(e) if e.is_recoverable_index_error() => {
                info!(reason = %e, "Creating new fact index");
            }
            Err(e) => return Err(e),
        }

        let index = Self::build(facts, embedder).await?;

        if let Err(e) = index.persist(dir) {
            warn!(
                error = %e,
                "Failed to persist fact index, continuing with in-memory index"
            );
        }

        Ok(index)
    }

    /// Nearest facts to an already-embedded query. Unmapped ids are dropped.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredFact>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let (distances, ids) = self.vectors.search(query, top_k)?;

        let hits: Vec<ScoredFact> = ids
            .into_iter()
            .zip(distances)
            .filter_map(|(id, distance)| {
                self.fact(id).map(|text| ScoredFact {
                    id,
                    distance,
                    text: text.to_string(),
                })
            })
            .collect();

        debug!(top_k, hits = hits.len(), "Index search complete");
        Ok(hits)
    }

    pub fn fact(&self, id: usize) -> Option<&str> {
        self.facts.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.vectors.dims()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// SHA-256 over the ordered fact texts; changes whenever the fact set does.
pub fn fingerprint(facts: &[Fact]) -> String {
    let mut hasher = Sha256::new();
    for fact in facts {
        hasher.update((fact.text.len() as u64).to_le_bytes());
        hasher.update(fact.text.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn into_embedding_failure(e: RagError) -> RagError {
    match e {
        RagError::EmbeddingFailure(_) | RagError::DimensionMismatch { .. } => e,
        other => RagError::EmbeddingFailure(other.to_string()),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => RagError::IndexNotFound(path.display().to_string()),
        _ => RagError::IndexCorrupt(format!("failed to read {}: {}", path.display(), e)),
    })
}

/// Uniquely named temp file in `dir`, removed on drop unless persisted
fn write_temp(dir: &Path, name: &str, bytes: &[u8]) -> Result<NamedTempFile> {
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}
