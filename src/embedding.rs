//! Embedding providers.
//!
//! One [`EmbeddingProvider`] instance embeds both sides of every
//! similarity comparison: the taxonomy's canonical keyword texts at
//! precompute time and the query text at match time. Mixing models
//! between the two sides makes cosine scores meaningless, so the vector
//! cache records the model name and refuses entries from any other.
//!
//! Backends:
//! - [`DisabledProvider`] — every embed call errors; the matcher stays
//!   in keyword mode.
//! - [`OpenAIProvider`] — `POST /v1/embeddings`, keyed by
//!   `OPENAI_API_KEY`.
//! - [`OllamaProvider`] — `POST /api/embed` on a local Ollama instance.
//! - `LocalProvider` — in-process fastembed inference, behind the
//!   `local-embeddings-fastembed` feature; offline after the first
//!   model download.
//!
//! The HTTP backends retry transient failures (429, 5xx, connection
//! errors) with exponential backoff capped at 32s; any other 4xx fails
//! immediately. Callers bound the whole embed with their own timeout
//! and degrade to keyword ranking, so a slow or absent model never
//! blocks a registration.
//!
//! The little-endian f32 blob helpers ([`vec_to_blob`] /
//! [`blob_to_vec`]) are the wire format of the vector cache.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// An embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded in the vector cache.
    fn model_name(&self) -> &str;

    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text (the matcher's query side).
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let batch = [text.to_string()];
        self.embed(&batch)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("empty embedding response"))
    }
}

/// Build the configured provider.
///
/// Fails for an unknown provider name, a missing API key, or a `local`
/// provider compiled without its feature.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("unknown embedding provider: {}", other),
    }
}

/// Placeholder backend for `provider = "disabled"`.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding provider is disabled")
    }
}

/// Backoff schedule shared by the HTTP backends: 1s, 2s, 4s, ... 32s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << (attempt - 1).min(5))
}

/// Send a request, retrying transient failures.
///
/// 429 and 5xx responses and connection errors are retried up to
/// `max_retries` times with [`backoff_delay`]; any other non-success
/// status fails at once.
async fn send_with_backoff<T, F>(build: F, max_retries: u32, what: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(attempt)).await;
        }

        let response = match build().send().await {
            Ok(r) => r,
            Err(e) => {
                last_err = Some(anyhow!("{} request failed: {}", what, e));
                continue;
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            last_err = Some(anyhow!("{} returned {}: {}", what, status, body));
            continue;
        }
        bail!("{} returned {}: {}", what, status, body);
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} failed", what)))
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// OpenAI embeddings API backend.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIRow>,
}

#[derive(Deserialize)]
struct OpenAIRow {
    embedding: Vec<f32>,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for the openai provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for the openai provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response: OpenAIResponse = send_with_backoff(
            || {
                self.client
                    .post("https://api.openai.com/v1/embeddings")
                    .bearer_auth(&self.api_key)
                    .json(&body)
            },
            self.max_retries,
            "OpenAI embeddings API",
        )
        .await?;

        Ok(response.data.into_iter().map(|row| row.embedding).collect())
    }
}

/// Local Ollama instance backend.
///
/// Needs an embedding model pulled first, e.g.
/// `ollama pull nomic-embed-text`.
pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for the ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for the ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/api/embed", self.url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response: OllamaResponse = send_with_backoff(
            || self.client.post(&endpoint).json(&body),
            self.max_retries,
            "Ollama /api/embed",
        )
        .await
        .map_err(|e| anyhow!("{} (is Ollama running at {}?)", e, self.url))?;

        Ok(response.embeddings)
    }
}

/// In-process fastembed backend.
///
/// The model is fetched from Hugging Face on first use and cached;
/// inference runs on a blocking thread. The supported set is the
/// multilingual family — the taxonomy and queries are mostly Japanese.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    model: fastembed::EmbeddingModel,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "multilingual-e5-small".to_string());

        let (model, default_dims) = match model_name.as_str() {
            "multilingual-e5-small" => (fastembed::EmbeddingModel::MultilingualE5Small, 384),
            "multilingual-e5-base" => (fastembed::EmbeddingModel::MultilingualE5Base, 768),
            "multilingual-e5-large" => (fastembed::EmbeddingModel::MultilingualE5Large, 1024),
            other => bail!(
                "unknown local embedding model '{}'; supported: multilingual-e5-small, \
                 multilingual-e5-base, multilingual-e5-large",
                other
            ),
        };

        Ok(Self {
            model_name,
            model,
            dims: config.dims.unwrap_or(default_dims),
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut engine = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow!("failed to initialize local embedding model: {}", e))?;

            engine
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("local embedding failed: {}", e))
        })
        .await?
    }
}

/// Encode a vector as little-endian f32 bytes, 4 bytes per component.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes back into a vector. A trailing
/// partial chunk is dropped.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity of two vectors, in `[-1.0, 1.0]`.
///
/// Mismatched lengths, empty inputs, and zero-norm vectors all score
/// `0.0` rather than erroring: for ranking purposes they are simply
/// unrelated.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt();

    let denom = norm_a * norm_b;
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_roundtrip() {
        let v = vec![0.5f32, -1.25, 42.0, 0.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
        assert_eq!(vec_to_blob(&v).len(), 16);
    }

    #[test]
    fn test_blob_drops_partial_chunk() {
        let mut blob = vec_to_blob(&[1.0f32]);
        blob.push(0xff);
        assert_eq!(blob_to_vec(&blob), vec![1.0f32]);
    }

    #[test]
    fn test_cosine_bounds() {
        let v = vec![2.0f32, 3.0, -1.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);

        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 5.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_disabled_provider_refuses_to_embed() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "disabled");
        assert_eq!(provider.dims(), 0);
        assert!(provider.embed_one("傘").await.is_err());
    }

    #[test]
    fn test_openai_provider_requires_key() {
        // No OPENAI_API_KEY in the test environment.
        if std::env::var("OPENAI_API_KEY").is_ok() {
            return;
        }
        let cfg = EmbeddingConfig {
            provider: "openai".to_string(),
            model: Some("text-embedding-3-small".to_string()),
            dims: Some(1536),
            ..Default::default()
        };
        assert!(create_provider(&cfg).is_err());
    }
}
