//! Cached, batched embedding of text.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::Embedding;
use crate::cache::EmbeddingCache;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest};

pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns text into fixed-dimension vectors through a provider, serving
/// repeated text from an [`EmbeddingCache`].
///
/// Every vector returned has exactly [`Embedder::dimension`] components.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    model: String,
    dimension: usize,
    request_dimensions: Option<usize>,
    timeout: Duration,
}

impl Embedder {
    /// Create an embedder using the provider's default model and dimension.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            model: provider.default_model().to_string(),
            dimension: provider.default_dimension(),
            provider,
            cache: EmbeddingCache::new(),
            request_dimensions: None,
            timeout: DEFAULT_EMBED_TIMEOUT,
        }
    }

    /// Use a shared cache instead of a private one.
    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request vectors of `dimension` components from the provider.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self.request_dimensions = Some(dimension);
        self
    }

    /// Bound each provider call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Cache namespace: vectors from different providers, models or
    /// dimensions never share entries.
    fn namespace(&self) -> String {
        format!("{}/{}/{}", self.provider.name(), self.model, self.dimension)
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding returned".to_string()))
    }

    /// Embed many texts, returning vectors in input order.
    ///
    /// Cache misses are deduplicated and sent to the provider in one batch.
    /// The cache is only written once the whole batch has been validated, so
    /// a failed call leaves it untouched.
    pub async fn embed_batch<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Embedding>> {
        let namespace = self.namespace();
        let mut slots: Vec<Option<Embedding>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<&str> = Vec::new();
        let mut miss_positions: HashMap<&str, usize> = HashMap::new();

        for text in texts {
            let text = text.as_ref();
            match self.cache.get(&namespace, text).await {
                Some(vector) => slots.push(Some(vector)),
                None => {
                    miss_positions.entry(text).or_insert_with(|| {
                        misses.push(text);
                        misses.len() - 1
                    });
                    slots.push(None);
                }
            }
        }

        debug!(
            "Embedding {} texts: {} cached, {} to fetch",
            texts.len(),
            slots.iter().filter(|s| s.is_some()).count(),
            misses.len()
        );

        let fetched = if misses.is_empty() {
            Vec::new()
        } else {
            self.fetch(&misses).await?
        };

        for (text, vector) in misses.iter().zip(fetched.iter()) {
            self.cache.put(&namespace, text, vector.clone()).await;
        }

        texts
            .iter()
            .zip(slots)
            .map(|(text, slot)| match slot {
                Some(vector) => Ok(vector),
                None => miss_positions
                    .get(text.as_ref())
                    .and_then(|&i| fetched.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        EmbeddingError::InvalidResponse("missing embedding for text".to_string())
                    }),
            })
            .collect()
    }

    async fn fetch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let requests: Vec<EmbeddingRequest> = texts
            .iter()
            .map(|text| {
                let request = EmbeddingRequest::new(*text).with_model(self.model.clone());
                match self.request_dimensions {
                    Some(dimensions) => request.with_dimensions(dimensions),
                    None => request,
                }
            })
            .collect();

        let responses = tokio::time::timeout(self.timeout, self.provider.embed_batch(requests))
            .await
            .map_err(|_| {
                warn!("Embedding provider {} timed out", self.provider.name());
                EmbeddingError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                }
            })??;

        if responses.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: responses.len(),
            });
        }

        let mut vectors = Vec::with_capacity(responses.len());
        for response in responses {
            if response.embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: response.embedding.len(),
                });
            }
            if response.embedding.iter().any(|x| !x.is_finite()) {
                return Err(EmbeddingError::InvalidResponse(
                    "embedding contains non-finite values".to_string(),
                ));
            }
            vectors.push(response.embedding);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{EmbeddingResponse, HashingProvider};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Records every batch it receives and delegates to a hashing provider.
    #[derive(Default)]
    struct RecordingProvider {
        batches: Mutex<Vec<Vec<String>>>,
        fail: bool,
        dimension_override: Option<usize>,
        delay: Option<Duration>,
    }

    impl RecordingProvider {
        fn batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn default_model(&self) -> &str {
            "test-model"
        }

        fn default_dimension(&self) -> usize {
            8
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
            let mut response = HashingProvider::new(8).embed(request).await?;
            if let Some(dimension) = self.dimension_override {
                response.embedding.resize(dimension, 0.0);
            }
            Ok(response)
        }

        async fn embed_batch(
            &self,
            requests: Vec<EmbeddingRequest>,
        ) -> Result<Vec<EmbeddingResponse>> {
            self.batches
                .lock()
                .unwrap()
                .push(requests.iter().map(|r| r.text.clone()).collect());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(EmbeddingError::Backend("service unavailable".to_string()));
            }
            let mut out = Vec::new();
            for request in requests {
                out.push(self.embed(request).await?);
            }
            Ok(out)
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_dedups_misses() {
        let provider = Arc::new(RecordingProvider::default());
        let embedder = Embedder::new(provider.clone());

        let vectors = embedder
            .embed_batch(&["alpha beta", "gamma", "alpha beta"])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);
        assert_eq!(
            provider.batches(),
            vec![vec!["alpha beta".to_string(), "gamma".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_cached_text_is_not_refetched() {
        let provider = Arc::new(RecordingProvider::default());
        let embedder = Embedder::new(provider.clone());

        let first = embedder.embed("mitochondria").await.unwrap();
        let again = embedder.embed_batch(&["mitochondria", "ribosome"]).await.unwrap();

        assert_eq!(again[0], first);
        assert_eq!(
            provider.batches(),
            vec![
                vec!["mitochondria".to_string()],
                vec!["ribosome".to_string()]
            ]
        );
        let stats = embedder.cache().stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing_to_cache() {
        let provider = Arc::new(RecordingProvider {
            fail: true,
            ..Default::default()
        });
        let embedder = Embedder::new(provider);

        let result = embedder.embed_batch(&["a b", "c d"]).await;

        assert!(matches!(result, Err(EmbeddingError::Backend(_))));
        assert!(embedder.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_rejected() {
        let provider = Arc::new(RecordingProvider {
            dimension_override: Some(5),
            ..Default::default()
        });
        let embedder = Embedder::new(provider);

        let result = embedder.embed("short vector").await;

        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch {
                expected: 8,
                actual: 5
            })
        ));
        assert!(embedder.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let provider = Arc::new(RecordingProvider {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let embedder = Embedder::new(provider).with_timeout(Duration::from_millis(20));

        let result = embedder.embed("anything").await;

        assert!(matches!(result, Err(EmbeddingError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_shared_cache_is_namespaced_by_model() {
        let cache = EmbeddingCache::new();
        let provider = Arc::new(RecordingProvider::default());
        let a = Embedder::new(provider.clone()).with_cache(cache.clone());
        let b = Embedder::new(provider.clone())
            .with_cache(cache.clone())
            .with_model("other-model");

        a.embed("same text").await.unwrap();
        b.embed("same text").await.unwrap();
        a.embed("same text").await.unwrap();

        assert_eq!(provider.batches().len(), 2);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_call() {
        let provider = Arc::new(RecordingProvider::default());
        let embedder = Embedder::new(provider.clone());

        let vectors = embedder.embed_batch::<&str>(&[]).await.unwrap();

        assert!(vectors.is_empty());
        assert!(provider.batches().is_empty());
    }
}
