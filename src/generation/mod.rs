//! Text generation and answer post-processing
//!
//! [`Generator`] is the opaque text-generation service. Raw output is turned
//! into an [`Answer`](crate::models::Answer) by locating the trailing answer
//! marker, asking a [`NoAnswerClassifier`] whether anything was produced, and
//! scoring the result with a [`ConfidenceScorer`].

use crate::Result;
use async_trait::async_trait;

pub mod bounded;
pub use bounded::BoundedGenerator;

/// Marker that precedes the answer in generator output
pub const ANSWER_MARKER: &str = "Answer";

/// Confidence reported by [`FixedConfidence::default`]
pub const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Text generation service (synchronous from the caller's view, unbounded latency)
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, max_length: usize) -> Result<String>;
}

/// Decides whether a candidate answer actually carries content
pub trait NoAnswerClassifier: Send + Sync {
    fn is_no_answer(&self, candidate: &str) -> bool;
}

/// Produces a confidence in `[0, 1]` for a successful answer
pub trait ConfidenceScorer: Send + Sync {
    fn score(&self, question: &str, candidate: &str) -> f32;
}

/// Flags answers whose body is empty or opens with a delimiter such as `--`.
#[derive(Debug, Clone)]
pub struct DelimiterClassifier {
    delimiter: String,
}

impl DelimiterClassifier {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }
}

impl Default for DelimiterClassifier {
    fn default() -> Self {
        Self::new("--")
    }
}

impl NoAnswerClassifier for DelimiterClassifier {
    fn is_no_answer(&self, candidate: &str) -> bool {
        let body = answer_body(candidate);
        body.is_empty() || (!self.delimiter.is_empty() && body.starts_with(&self.delimiter))
    }
}

/// Same score for every non-empty answer. Not a calibrated probability.
#[derive(Debug, Clone, Copy)]
pub struct FixedConfidence(pub f32);

impl Default for FixedConfidence {
    fn default() -> Self {
        Self(DEFAULT_CONFIDENCE)
    }
}

impl ConfidenceScorer for FixedConfidence {
    fn score(&self, _question: &str, _candidate: &str) -> f32 {
        self.0
    }
}

/// Prompt layout fed to the generator
pub fn build_prompt(context: &str, question: &str) -> String {
    format!("Context: {}\nQuestion: {}\nAnswer:", context, question)
}

/// Everything from the last answer marker onward, marker included.
///
/// Output without a marker is returned trimmed as a whole.
pub fn extract_candidate(raw: &str) -> &str {
    match raw.rfind(ANSWER_MARKER) {
        Some(pos) => raw[pos..].trim_end(),
        None => raw.trim(),
    }
}

/// Candidate text with the leading marker and its colon removed
fn answer_body(candidate: &str) -> &str {
    let body = candidate.strip_prefix(ANSWER_MARKER).unwrap_or(candidate);
    body.trim_start()
        .strip_prefix(':')
        .unwrap_or(body)
        .trim()
}
