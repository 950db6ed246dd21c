//! Query Embedder
//!
//! Text-embedding capability used to build the semantic cache and to encode
//! incoming questions. Both sides must go through the same [`Embedder`] so the
//! vectors live in one space.

use crate::config::ResolverConfig;
use crate::error::{with_timeout, ResolverError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Encode one string into a fixed-length vector
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Embedding client using the OpenAI `/embeddings` API
pub struct OpenAiEmbedder {
    api_key: String,
    base_url: String,
    model: String, // e.g., "text-embedding-3-small"
    timeout_secs: u64,
    http: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: String, model: String, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                ResolverError::transport("embedding", format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self {
            api_key,
            base_url,
            model,
            timeout_secs,
            http,
        })
    }

    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        Self::new(
            config.api_key.clone(),
            config.api_base_url.clone(),
            config.embedding_model.clone(),
            config.embedding_timeout_secs,
        )
    }

    async fn request_embedding(&self, text: &str) -> Result<Embedding> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ResolverError::transport("embedding", format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ResolverError::transport(
                "embedding",
                format!("Embedding API error ({}): {}", status, error_text),
            ));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            ResolverError::transport("embedding", format!("Failed to parse embedding response: {}", e))
        })?;

        parse_embedding_response(&response_json)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        with_timeout("embedding", self.timeout_secs, self.request_embedding(text)).await
    }
}

/// Extract `data[0].embedding` from an embeddings payload
pub fn parse_embedding_response(response_json: &serde_json::Value) -> Result<Embedding> {
    let data = response_json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| ResolverError::transport("embedding", "No embedding data in response"))?;

    let embedding: Vec<f32> = data
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| ResolverError::transport("embedding", "No embedding vector in response"))?
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();

    if embedding.is_empty() {
        return Err(ResolverError::transport("embedding", "Empty embedding vector in response"));
    }
    Ok(embedding)
}

/// Offline embedder: feature-hashed bag of words.
///
/// Used when no API key is configured. Identical token sets map to identical
/// vectors, so it behaves sensibly for near-verbatim rephrasings only.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let slot = (fnv1a(token.as_bytes()) % self.dimension as u64) as usize;
            vector[slot] += 1.0;
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed_sync(text))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
