//! Mock services for development & testing
//!
//! Keep the pipeline runnable without network access or model weights.

use crate::embedding::{Embedder, HashingEmbedder};
use crate::error::RagError;
use crate::generation::Generator;
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Generator that echoes the prompt followed by a canned reply,
/// the way a causal language model returns prompt + continuation.
pub struct MockGenerator {
    reply: String,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    last_max_length: Mutex<Option<usize>>,
}

impl MockGenerator {
    pub fn echoing(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            last_max_length: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }

    pub fn last_max_length(&self) -> Option<usize> {
        self.last_max_length.lock().ok().and_then(|m| *m)
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, prompt: &str, max_length: usize) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }
        if let Ok(mut last) = self.last_max_length.lock() {
            *last = Some(max_length);
        }
        Ok(format!("{} {}", prompt, self.reply))
    }
}

/// Generator that sleeps before replying
pub struct SlowGenerator {
    delay: Duration,
    reply: String,
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl SlowGenerator {
    pub fn new(delay: Duration, reply: impl Into<String>) -> Self {
        Self {
            delay,
            reply: reply.into(),
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for SlowGenerator {
    async fn generate(&self, prompt: &str, _max_length: usize) -> Result<String> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} {}", prompt, self.reply))
    }
}

/// Generator whose backend is always down
pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _prompt: &str, _max_length: usize) -> Result<String> {
        Err(RagError::GenerationFailure(
            "generation backend unavailable".to_string(),
        ))
    }
}

/// Embedder whose backend is always down
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingFailure(
            "embedding backend unavailable".to_string(),
        ))
    }
}

/// Hashing embedder that counts how often it is called
pub struct CountingEmbedder {
    inner: HashingEmbedder,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(dims),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }
}
