use crate::embeddings::EmbeddingCache;
use crate::error::{Result, ScholaragError};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const MAX_RETRIES: usize = 2;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Ollama embeddings client
///
/// Turns text into a fixed-length vector through the `/api/embeddings`
/// endpoint, with retry on transient failures and an optional LRU cache for
/// repeated queries. Safe for concurrent use across sessions (reqwest clients
/// are cheap to share).
pub struct OllamaEmbedder {
    client: Client,
    api_url: String,
    model: String,
    dimensions: usize,
    cache: Option<Arc<EmbeddingCache>>,
}

impl OllamaEmbedder {
    /// Create a new embedder. `dimensions` is the configured dimensionality
    /// of the vector index; responses of any other length are rejected.
    pub fn new(api_url: String, model: String, dimensions: usize) -> Self {
        Self::with_cache(api_url, model, dimensions, None)
    }

    /// Create an embedder with an optional query-embedding cache
    pub fn with_cache(
        api_url: String,
        model: String,
        dimensions: usize,
        cache: Option<Arc<EmbeddingCache>>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_url,
            model,
            dimensions,
            cache,
        }
    }

    /// Embed a single text, consulting the cache first.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(text) {
                log::debug!("Embedding cache hit");
                return Ok(cached);
            }
        }

        let embedding = self.embed_with_retry(text).await?;

        if let Some(cache) = &self.cache {
            cache.put(text.to_string(), embedding.clone());
        }

        Ok(embedding)
    }

    /// Embed many texts with a bounded worker pool.
    ///
    /// Up to `workers` requests run concurrently; each result lands in its
    /// own slot of the returned vector, in input order. A failed text yields
    /// an empty vector (logged), never aborting the batch.
    pub async fn embed_many(&self, texts: Vec<String>, workers: usize) -> Vec<Vec<f32>> {
        let workers = workers.max(1);
        let total = texts.len();
        let mut results: Vec<Vec<f32>> = vec![Vec::new(); total];

        let mut stream = futures_util::stream::iter(texts.into_iter().enumerate().map(
            |(idx, text)| async move {
                let result = self.embed_with_retry(&text).await;
                (idx, result)
            },
        ))
        .buffer_unordered(workers);

        while let Some((idx, result)) = stream.next().await {
            match result {
                Ok(embedding) => results[idx] = embedding,
                Err(e) => log::warn!("Embedding failed for chunk {}: {}", idx, e),
            }
        }

        results
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.embed_once(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) if attempt < MAX_RETRIES && is_retryable(&e) => {
                    log::warn!("Retry {}/{} after embedding error: {}", attempt + 1, MAX_RETRIES, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ScholaragError::Embedding(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ScholaragError::Embedding(format!(
                "Embedding API error {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ScholaragError::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.embedding.len() != self.dimensions {
            return Err(ScholaragError::Embedding(format!(
                "Unexpected embedding dimension: expected {}, got {}",
                self.dimensions,
                result.embedding.len()
            )));
        }

        Ok(result.embedding)
    }
}

/// Rate limits and server-side failures are worth retrying; anything else
/// (connection refused, bad request) fails immediately.
fn is_retryable(e: &ScholaragError) -> bool {
    let msg = e.to_string();
    ["429", "500", "502", "503", "504"].iter().any(|code| msg.contains(code))
}
