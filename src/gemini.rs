//! Gemini API client
//!
//! Backs both external services of the pipeline:
//! - [`Generator`] via `generateContent`
//! - [`Embedder`] via `embedContent` / `batchEmbedContents`
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::embedding::Embedder;
use crate::error::RagError;
use crate::generation::Generator;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GENERATION_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Upper bound on requests per `batchEmbedContents` call
const MAX_BATCH: usize = 100;

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    generation_model: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    fn ensure_key(&self) -> crate::Result<()> {
        if self.api_key.is_empty() {
            return Err(RagError::Config("GEMINI_API_KEY not configured".to_string()));
        }
        Ok(())
    }

    /// The key travels in a header so it never shows up in URLs or logs.
    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post<B, R>(&self, url: &str, body: &B) -> crate::Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Gemini API request failed: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response ({}): {}", status, error_text);
            return Err(RagError::Config(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        Ok(response.json().await?)
    }

    /// Raw completion text for `prompt`
    pub async fn generate_text(&self, prompt: &str, max_output_tokens: usize) -> crate::Result<String> {
        self.ensure_key()
            .map_err(|e| RagError::GenerationFailure(e.to_string()))?;

        let request = GenerateRequest {
            contents: vec![Content::text(prompt)],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens,
            },
        };

        info!(model = %self.generation_model, "Calling Gemini generateContent");

        let url = self.url(&self.generation_model, "generateContent");
        let response: GenerateResponse = self
            .post(&url, &request)
            .await
            .map_err(|e| RagError::GenerationFailure(format!("Gemini API error: {}", e)))?;

        let text = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| {
                RagError::GenerationFailure("Empty response from Gemini".to_string())
            })?;

        Ok(text)
    }

    async fn embed_chunk(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        let model = format!("models/{}", self.embedding_model);
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| EmbedRequest {
                    model: model.clone(),
                    content: Content::text(t),
                })
                .collect(),
        };

        let url = self.url(&self.embedding_model, "batchEmbedContents");
        let response: BatchEmbedResponse = self
            .post(&url, &request)
            .await
            .map_err(|e| RagError::EmbeddingFailure(format!("Gemini API error: {}", e)))?;

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[async_trait]
impl Generator for GeminiClient {
    /// Prompt followed by the completion, so output carries the answer marker
    /// the same way a causal model's decoded sequence does.
    async fn generate(&self, prompt: &str, max_length: usize) -> crate::Result<String> {
        let completion = self.generate_text(prompt, max_length).await?;
        Ok(format!("{} {}", prompt, completion.trim()))
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
        self.ensure_key()
            .map_err(|e| RagError::EmbeddingFailure(e.to_string()))?;

        let request = EmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content::text(text),
        };

        let url = self.url(&self.embedding_model, "embedContent");
        let response: EmbedResponse = self
            .post(&url, &request)
            .await
            .map_err(|e| RagError::EmbeddingFailure(format!("Gemini API error: {}", e)))?;

        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        self.ensure_key()
            .map_err(|e| RagError::EmbeddingFailure(e.to_string()))?;

        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH) {
            vectors.extend(self.embed_chunk(chunk).await?);
        }

        info!(count = vectors.len(), "Gemini embeddings received");
        Ok(vectors)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

impl Content {
    fn text(text: &str) -> Self {
        Self {
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}
