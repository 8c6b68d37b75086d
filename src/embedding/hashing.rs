//! Deterministic hashing embedder
//!
//! Feature hashing over lower-cased word tokens and word bigrams, with
//! SHA-256 choosing both bucket and sign. No network, no model files, and
//! the same text always maps to the same vector. Good enough for keyword-ish
//! retrieval over short fact sentences.

use super::Embedder;
use crate::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

pub struct HashingEmbedder {
    dims: usize,
    model_name: String,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            model_name: format!("sha256-hashing-{}", dims),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Synchronous embedding, exposed for callers outside an async context
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut vector = vec![0.0f32; self.dims];

        for token in &tokens {
            self.accumulate(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }

        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);

        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

        vector[bucket] += sign * weight;
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_sync("Revenue - year 2021 is: 120");
        let b = embedder.embed_sync("Revenue - year 2021 is: 120");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_insensitive() {
        let embedder = HashingEmbedder::new(32);
        assert_eq!(
            embedder.embed_sync("NET PROFIT"),
            embedder.embed_sync("net profit")
        );
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_sync("").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_batch_matches_single() {
        let embedder = HashingEmbedder::new(16);
        let texts = vec!["revenue".to_string(), "profit".to_string()];
        let batch = tokio_test::block_on(embedder.embed_batch(&texts)).unwrap();

        assert_eq!(batch[0], embedder.embed_sync("revenue"));
        assert_eq!(batch[1], embedder.embed_sync("profit"));
    }
}
