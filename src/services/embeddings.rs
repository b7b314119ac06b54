//! Embedding service with multi-provider fallback.
//!
//! Supports OpenAI- and Gemini-shaped embedding APIs with automatic
//! fallback when rate limits are hit or providers fail. Falls back to
//! deterministic hash-based placeholders when no providers are configured,
//! which keeps the service (and its tests) fully offline-capable.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{Error, Result};

/// Maximum retries per provider before fallback
const MAX_RETRIES: u32 = 2;

/// Delay between retries (doubles each time)
const RETRY_DELAY_MS: u64 = 500;

/// Maximum texts per batch for API calls
const MAX_BATCH_SIZE: usize = 100;

/// Service for generating text embeddings.
///
/// Tries providers in priority order, automatically falling back on
/// failures. Uses hash-based placeholders when no providers are configured.
#[derive(Clone)]
pub struct EmbeddingService {
    inner: Arc<EmbeddingServiceInner>,
}

struct EmbeddingServiceInner {
    providers: Vec<EmbeddingProvider>,
    dimension: usize,
    client: Client,
}

/// OpenAI embedding response
#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Option<Vec<OpenAiEmbedding>>,
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}

/// Gemini batch embedding response
#[derive(Debug, Deserialize)]
struct GeminiBatchResponse {
    embeddings: Option<Vec<GeminiEmbedding>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

impl EmbeddingService {
    /// Create a new embedding service from configuration.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        if config.providers.is_empty() {
            warn!(
                dimension = config.dimension,
                "No embedding providers configured - using hash-based placeholders"
            );
        } else {
            debug!(
                providers = ?config.providers.iter().map(|p| &p.name).collect::<Vec<_>>(),
                dimension = config.dimension,
                "Embedding service initialized"
            );
        }

        Ok(Self {
            inner: Arc::new(EmbeddingServiceInner {
                providers: config.providers.clone(),
                dimension: config.dimension,
                client,
            }),
        })
    }

    /// The dimension of vectors this service produces.
    pub fn dimension(&self) -> usize {
        self.inner.dimension
    }

    /// Embed a single text.
    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
    }

    /// Embed a batch of texts, preserving input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            all.extend(self.embed_batch(batch).await?);
        }
        Ok(all)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        for provider in &self.inner.providers {
            let mut delay = RETRY_DELAY_MS;
            for attempt in 0..=MAX_RETRIES {
                let result = match provider.name.as_str() {
                    "gemini" => self.embed_gemini(provider, texts).await,
                    _ => self.embed_openai(provider, texts).await,
                };

                match result {
                    Ok(vectors) => return Ok(vectors),
                    Err(e) => {
                        warn!(
                            provider = %provider.name,
                            attempt,
                            error = %e,
                            "Embedding request failed"
                        );
                        if attempt < MAX_RETRIES {
                            sleep(Duration::from_millis(delay)).await;
                            delay *= 2;
                        }
                    }
                }
            }
        }

        // No provider configured or all exhausted: deterministic placeholder
        debug!(count = texts.len(), "Using hash-based placeholder embeddings");
        Ok(texts
            .iter()
            .map(|t| hash_embedding(t, self.inner.dimension))
            .collect())
    }

    async fn embed_openai(
        &self,
        provider: &EmbeddingProvider,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", provider.base_url.trim_end_matches('/'));

        let response: OpenAiEmbedResponse = self
            .inner
            .client
            .post(&url)
            .bearer_auth(&provider.api_key)
            .json(&json!({
                "model": provider.model,
                "input": texts,
            }))
            .send()
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(Error::Embedding(error.message));
        }

        let mut data = response
            .data
            .ok_or_else(|| Error::Embedding("missing data in response".to_string()))?;
        data.sort_by_key(|d| d.index);

        if data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn embed_gemini(
        &self,
        provider: &EmbeddingProvider,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            provider.base_url.trim_end_matches('/'),
            provider.model,
            provider.api_key
        );

        let requests: Vec<_> = texts
            .iter()
            .map(|t| {
                json!({
                    "model": format!("models/{}", provider.model),
                    "content": { "parts": [{ "text": t }] },
                })
            })
            .collect();

        let response: GeminiBatchResponse = self
            .inner
            .client
            .post(&url)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(Error::Embedding(error.message));
        }

        let embeddings = response
            .embeddings
            .ok_or_else(|| Error::Embedding("missing embeddings in response".to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings.into_iter().map(|e| e.values).collect())
    }
}

/// Deterministic placeholder embedding derived from the text's hash.
///
/// Unit-normalized so cosine distance behaves; identical texts always
/// produce identical vectors.
fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut values = Vec::with_capacity(dimension);
    let mut counter: u32 = 0;

    while values.len() < dimension {
        let mut hasher = Sha256::new();
        hasher.update(counter.to_le_bytes());
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();

        for chunk in digest.chunks(4) {
            if values.len() >= dimension {
                break;
            }
            let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            // Map to [-1, 1]
            values.push((bits as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }
        counter += 1;
    }

    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut values {
            *v /= norm;
        }
    }
    values
}
