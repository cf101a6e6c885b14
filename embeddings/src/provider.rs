//! Embedding providers.
//!
//! Supports OpenAI-compatible embedding APIs and a deterministic offline
//! hashing model.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";
const OPENAI_TIMEOUT: Duration = Duration::from_secs(60);

/// Seconds to wait when a 429 carries no usable `Retry-After`.
const FALLBACK_RETRY_AFTER_SECS: u64 = 60;

/// One text to embed, with optional per-call overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRequest {
    pub text: String,
    /// Overrides the provider's default model.
    pub model: Option<String>,
    /// Requested output width, for models that can shorten their vectors.
    pub dimensions: Option<usize>,
}

impl EmbeddingRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            dimensions: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// A vector returned by a provider, tagged with the model that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Embedding,
    pub model: String,
    pub dimension: usize,
    pub tokens_used: Option<u64>,
}

/// A backend that turns text into vectors.
///
/// Implementations must be safe to share between sessions. `embed_batch`
/// returns one response per request, in request order; providers with a
/// native batch endpoint should override the sequential fallback.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short identifier, used to namespace cache entries.
    fn name(&self) -> &str;

    fn default_model(&self) -> &str;

    fn default_dimension(&self) -> usize;

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        let mut out = Vec::with_capacity(requests.len());
        for request in requests {
            out.push(self.embed(request).await?);
        }
        Ok(out)
    }

    /// Whether the provider can serve requests right now (credentials present).
    fn is_available(&self) -> bool;
}

/// Output width of the known OpenAI embedding models.
fn openai_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        // text-embedding-3-small, text-embedding-ada-002 and unknown models
        _ => 1536,
    }
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
///
/// The key is read from `OPENAI_API_KEY`. A whole batch is sent as one
/// request and the response is re-ordered by each item's `index`.
pub struct OpenAIProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
    default_model: String,
    timeout: Duration,
}

impl OpenAIProvider {
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: OPENAI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            default_model: OPENAI_DEFAULT_MODEL.to_string(),
            timeout: OPENAI_TIMEOUT,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn send(&self, body: &EmbeddingsBody<'_>) -> Result<EmbeddingsReply> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(EmbeddingError::ProviderNotConfigured);
        };

        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, &headers, &detail));
        }

        response
            .json::<EmbeddingsReply>()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))
    }

    fn transport_error(&self, error: reqwest::Error) -> EmbeddingError {
        if error.is_timeout() {
            return EmbeddingError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            };
        }
        EmbeddingError::Http(error)
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn status_error(status: StatusCode, headers: &HeaderMap, detail: &str) -> EmbeddingError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(FALLBACK_RETRY_AFTER_SECS);
        return EmbeddingError::RateLimited { retry_after_secs };
    }
    EmbeddingError::ApiRequest(format!("{status}: {detail}"))
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn default_dimension(&self) -> usize {
        openai_dimension(&self.default_model)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.embed_batch(vec![request])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding list".to_string()))
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        let Some(first) = requests.first() else {
            return Ok(Vec::new());
        };

        let model = first.model.as_deref().unwrap_or(&self.default_model);
        let input: Vec<&str> = requests.iter().map(|r| r.text.as_str()).collect();
        debug!("POST /embeddings: {} inputs, model {model}", input.len());

        let body = EmbeddingsBody {
            input: &input,
            model,
            dimensions: first.dimensions,
        };
        let reply = self.send(&body).await?;

        if reply.data.len() != requests.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: requests.len(),
                actual: reply.data.len(),
            });
        }

        let EmbeddingsReply {
            mut data,
            model,
            usage,
        } = reply;
        data.sort_by_key(|item| item.index);
        if let Some((position, item)) = data
            .iter()
            .enumerate()
            .find(|(position, item)| item.index != *position)
        {
            return Err(EmbeddingError::InvalidResponse(format!(
                "embedding index {} at position {position}",
                item.index
            )));
        }

        info!(
            "Embedded {} texts with {model} ({} tokens)",
            data.len(),
            usage.map_or(0, |u| u.total_tokens)
        );

        Ok(data
            .into_iter()
            .map(|item| EmbeddingResponse {
                dimension: item.embedding.len(),
                embedding: item.embedding,
                model: model.clone(),
                tokens_used: None,
            })
            .collect())
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsBody<'a> {
    input: &'a [&'a str],
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsReply {
    data: Vec<EmbeddingItem>,
    model: String,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

/// Offline embedding provider using feature hashing.
///
/// Each lowercase alphanumeric token is hashed with SHA-256 into one of
/// `dimension` buckets. Text with no such token (rule lines, dot leaders,
/// runs of symbols) is hashed character by character instead, so every
/// non-empty chunk gets a vector. Vectors are deterministic across runs and
/// platforms, which makes this provider suitable for local use and tests.
pub struct HashingProvider {
    dimension: usize,
}

impl HashingProvider {
    /// Create a hashing provider with the given output dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn bucket(&self, feature: &str) -> usize {
        let digest = Sha256::digest(feature.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(prefix) % self.dimension as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Result<Embedding> {
        if self.dimension == 0 {
            return Err(EmbeddingError::InvalidInput(
                "hashing dimension must be greater than zero".to_string(),
            ));
        }
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text is empty".to_string()));
        }

        let mut vector = vec![0.0f32; self.dimension];
        let mut tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .peekable();

        if tokens.peek().is_some() {
            for token in tokens {
                vector[self.bucket(&token.to_lowercase())] += 1.0;
            }
        } else {
            let mut buf = [0u8; 4];
            for c in text.chars() {
                vector[self.bucket(c.encode_utf8(&mut buf))] += 1.0;
            }
        }
        Ok(vector)
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn name(&self) -> &str {
        "hashing"
    }

    fn default_model(&self) -> &str {
        "feature-hashing-sha256"
    }

    fn default_dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let embedding = self.vectorize(&request.text)?;
        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: self.default_model().to_string(),
            tokens_used: Some(request.text.split_whitespace().count() as u64),
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}
