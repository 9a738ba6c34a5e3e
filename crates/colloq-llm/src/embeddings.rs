//! Text embedders for the semantic recall index.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::with_retry;
use crate::error::{LlmError, Result};
use crate::http::ApiClient;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts. Calls [`Embedder::embed`] once per text unless
    /// the provider can batch.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Length of every vector this embedder returns.
    fn dimensions(&self) -> usize;

    fn name(&self) -> &str;
}

pub type SharedEmbedder = Arc<dyn Embedder>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic offline embedder.
///
/// Each lowercase alphanumeric token seeds a pseudo-random vector; the sum
/// over tokens is normalized to unit length. Texts that share words land
/// closer together than texts that do not, which is enough for recall tests.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn token_vector(&self, token: &str, acc: &mut [f32]) {
        // djb2 seed, LCG stream
        let mut state = token
            .bytes()
            .fold(5381u64, |h, b| h.wrapping_mul(33).wrapping_add(u64::from(b)));
        for value in acc.iter_mut() {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            *value += ((state >> 16) & 0xffff) as f32 / 32_768.0 - 1.0;
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .for_each(|token| self.token_vector(token, &mut vector));

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible
// ─────────────────────────────────────────────────────────────────────────────

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Requested output size, for models that can shorten their vectors.
    pub dimensions: Option<usize>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl OpenAiEmbedderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: None,
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Vector length the configured model will return.
    pub fn effective_dimensions(&self) -> usize {
        self.dimensions.unwrap_or(match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        })
    }
}

/// [`Embedder`] over `/embeddings`, batching inputs into one request.
pub struct OpenAiEmbedder {
    api: ApiClient,
    config: OpenAiEmbedderConfig,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(LlmError::Config("embedding API key is empty".to_string()));
        }
        let api = ApiClient::new(&config.base_url, Some(config.api_key.clone()), config.timeout)?;
        let dimensions = config.effective_dimensions();
        Ok(Self {
            api,
            config,
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or_else(|| LlmError::Backend("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.config.dimensions,
        };
        let reply: EmbeddingReply = with_retry(
            self.config.max_retries,
            Duration::from_millis(500),
            "openai-embeddings",
            || self.api.post_json("embeddings", &body),
        )
        .await?;

        reply.into_vectors(texts.len(), self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingReply {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingReply {
    /// Vectors in input order, checked for count and length.
    fn into_vectors(mut self, expected_count: usize, dims: usize) -> Result<Vec<Vec<f32>>> {
        if self.data.len() != expected_count {
            return Err(LlmError::Backend(format!(
                "expected {expected_count} embeddings, got {}",
                self.data.len()
            )));
        }
        self.data.sort_by_key(|item| item.index);
        self.data
            .into_iter()
            .map(|item| {
                if item.embedding.len() == dims {
                    Ok(item.embedding)
                } else {
                    Err(LlmError::Dimensions {
                        expected: dims,
                        actual: item.embedding.len(),
                    })
                }
            })
            .collect()
    }
}
