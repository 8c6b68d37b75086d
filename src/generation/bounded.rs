//! Bounded Generator
//!
//! MODERATE → RETRIEVE → GENERATE (under deadline) → POST-PROCESS
//!
//! Retrieval and generation run in a spawned task. When the deadline passes
//! the task is aborted and a fixed timeout answer is returned; the caller
//! never waits longer than the deadline plus scheduling overhead.

use super::{
    build_prompt, extract_candidate, ConfidenceScorer, DelimiterClassifier, FixedConfidence,
    Generator, NoAnswerClassifier,
};
use crate::config::{RagConfig, DEFAULT_MAX_LENGTH, DEFAULT_TIMEOUT_SECS, DEFAULT_TOP_K};
use crate::error::RagError;
use crate::models::Answer;
use crate::moderation::{ModerationGate, REJECTION_MESSAGE};
use crate::retriever::Retriever;
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const TIMEOUT_MESSAGE: &str = "Execution exceeded time limit. Stopping function.";
pub const NO_ANSWER_MESSAGE: &str = "No relevant information found";

pub struct BoundedGenerator {
    gate: ModerationGate,
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    classifier: Arc<dyn NoAnswerClassifier>,
    scorer: Arc<dyn ConfidenceScorer>,
    top_k: usize,
    max_length: usize,
    deadline: Duration,
}

impl BoundedGenerator {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>) -> Self {
        Self {
            gate: ModerationGate::new(),
            retriever,
            generator,
            classifier: Arc::new(DelimiterClassifier::default()),
            scorer: Arc::new(FixedConfidence::default()),
            top_k: DEFAULT_TOP_K,
            max_length: DEFAULT_MAX_LENGTH,
            deadline: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn from_config(
        retriever: Retriever,
        generator: Arc<dyn Generator>,
        config: &RagConfig,
    ) -> Self {
        Self::new(retriever, generator)
            .with_top_k(config.top_k)
            .with_max_length(config.max_length)
            .with_deadline(config.timeout)
    }

    pub fn with_gate(mut self, gate: ModerationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn NoAnswerClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ConfidenceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Answer `question` under the configured deadline.
    ///
    /// Moderation rejections and timeouts come back as `Ok` fallbacks with
    /// zero confidence; service failures come back as `GenerationFailure`.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        self.answer_with_deadline(question, self.deadline).await
    }

    pub async fn answer_with_deadline(&self, question: &str, deadline: Duration) -> Result<Answer> {
        if !self.gate.is_permitted(question) {
            return Ok(Answer::fallback(REJECTION_MESSAGE));
        }

        match self.generate_bounded(question, deadline).await {
            Ok(raw) => Ok(self.postprocess(question, &raw)),
            Err(RagError::GenerationTimeout(ms)) => {
                warn!(deadline_ms = ms, "Generation exceeded deadline, task aborted");
                Ok(Answer::fallback(TIMEOUT_MESSAGE))
            }
            Err(e) => Err(e),
        }
    }

    /// Retrieval + generation in a cancellable task; raw generator output
    async fn generate_bounded(&self, question: &str, deadline: Duration) -> Result<String> {
        let retriever = self.retriever.clone();
        let generator = Arc::clone(&self.generator);
        let question = question.to_string();
        let top_k = self.top_k;
        let max_length = self.max_length;

        let started = Instant::now();

        let task = tokio::spawn(async move {
            let facts = retriever.retrieve(&question, top_k).await?;
            debug!(fact_count = facts.len(), "Context retrieved");

            let prompt = build_prompt(&facts.join(" "), &question);
            generator.generate(&prompt, max_length).await
        });
        let abort = task.abort_handle();

        match tokio::time::timeout(deadline, task).await {
            Err(_) => {
                abort.abort();
                Err(RagError::GenerationTimeout(deadline.as_millis() as u64))
            }
            Ok(Err(join_error)) => Err(RagError::GenerationFailure(format!(
                "generation task failed: {}",
                join_error
            ))),
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "Generation failed");
                Err(into_generation_failure(e))
            }
            Ok(Ok(Ok(raw))) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Generation completed"
                );
                Ok(raw)
            }
        }
    }

    fn postprocess(&self, question: &str, raw: &str) -> Answer {
        let candidate = extract_candidate(raw);

        if self.classifier.is_no_answer(candidate) {
            return Answer::fallback(NO_ANSWER_MESSAGE);
        }

        let confidence = self.scorer.score(question, candidate).clamp(0.0, 1.0);
        Answer::new(candidate, confidence)
    }
}

fn into_generation_failure(e: RagError) -> RagError {
    match e {
        RagError::GenerationFailure(_) => e,
        other => RagError::GenerationFailure(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedder, HashingEmbedder};
    use crate::index::FactIndex;
    use crate::models::Fact;
    use crate::testing::{
        CountingEmbedder, FailingEmbedder, FailingGenerator, MockGenerator, SlowGenerator,
    };

    async fn retriever_with(embedder: Arc<dyn Embedder>) -> Retriever {
        let facts = vec![
            Fact { id: 0, text: "Revenue - year 2020 is: 100".to_string() },
            Fact { id: 1, text: "Revenue - year 2021 is: 120".to_string() },
        ];
        let index = FactIndex::build(&facts, &HashingEmbedder::new(32)).await.unwrap();
        Retriever::new(Arc::new(index), embedder)
    }

    async fn retriever() -> Retriever {
        retriever_with(Arc::new(HashingEmbedder::new(32))).await
    }

    #[tokio::test]
    async fn test_successful_answer() {
        let generator = Arc::new(MockGenerator::echoing("Revenue grew 8%."));
        let bounded = BoundedGenerator::new(retriever().await, generator.clone());

        let answer = bounded.answer("How did revenue change?").await.unwrap();
        assert_eq!(answer, Answer::new("Answer: Revenue grew 8%.", 0.9));

        let prompt = generator.last_prompt().unwrap();
        assert!(prompt.starts_with("Context: Revenue - year"));
        assert!(prompt.ends_with("Question: How did revenue change?\nAnswer:"));
        assert_eq!(generator.last_max_length(), Some(100));
    }

    #[tokio::test]
    async fn test_no_content_produced() {
        let generator = Arc::new(MockGenerator::echoing("--"));
        let bounded = BoundedGenerator::new(retriever().await, generator);

        let answer = bounded.answer("What was revenue in 2030?").await.unwrap();
        assert_eq!(answer, Answer::new("No relevant information found", 0.0));
    }

    #[tokio::test]
    async fn test_moderation_short_circuits() {
        let embedder = Arc::new(CountingEmbedder::new(32));
        let generator = Arc::new(MockGenerator::echoing("anything"));
        let bounded = BoundedGenerator::new(retriever_with(embedder.clone()).await, generator.clone());

        let answer = bounded.answer("what about hacking the system").await.unwrap();
        assert_eq!(answer.text, REJECTION_MESSAGE);
        assert_eq!(answer.confidence, 0.0);
        assert_eq!(generator.calls(), 0);
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_returns_promptly() {
        let generator = Arc::new(SlowGenerator::new(Duration::from_secs(30), "late"));
        let bounded = BoundedGenerator::new(retriever().await, generator.clone())
            .with_deadline(Duration::from_millis(50));

        let started = Instant::now();
        let answer = bounded.answer("revenue?").await.unwrap();

        assert_eq!(answer, Answer::new(TIMEOUT_MESSAGE, 0.0));
        assert!(started.elapsed() < Duration::from_secs(5));

        // Aborted task never reaches completion.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(generator.completed(), 0);
    }

    #[tokio::test]
    async fn test_generator_failure_propagates() {
        let bounded = BoundedGenerator::new(retriever().await, Arc::new(FailingGenerator));
        let err = bounded.answer("revenue?").await.unwrap_err();
        assert!(matches!(err, RagError::GenerationFailure(_)));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_generation_failure() {
        let bounded = BoundedGenerator::new(
            retriever_with(Arc::new(FailingEmbedder)).await,
            Arc::new(MockGenerator::echoing("x")),
        );
        let err = bounded.answer("revenue?").await.unwrap_err();
        assert!(matches!(err, RagError::GenerationFailure(_)));
    }

    #[tokio::test]
    async fn test_pluggable_scorer_is_clamped() {
        struct Overconfident;
        impl ConfidenceScorer for Overconfident {
            fn score(&self, _: &str, _: &str) -> f32 {
                3.0
            }
        }

        let bounded = BoundedGenerator::new(
            retriever().await,
            Arc::new(MockGenerator::echoing("Revenue was 120.")),
        )
        .with_scorer(Arc::new(Overconfident));

        let answer = bounded.answer("revenue 2021?").await.unwrap();
        assert_eq!(answer.confidence, 1.0);
    }
}
