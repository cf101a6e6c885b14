//! Content-addressed embedding cache.
//!
//! Keys are the SHA-256 of the model namespace and the exact text, so the
//! same text embedded by two models never collides. Entries are write-once:
//! the first stored vector for a key wins. The cache is unbounded and lives
//! as long as its owner; clones share the same storage.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Embedding;

#[derive(Default)]
struct Inner {
    entries: RwLock<HashMap<String, Embedding>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cache for embeddings to avoid redundant backend calls.
#[derive(Clone, Default)]
pub struct EmbeddingCache {
    inner: Arc<Inner>,
}

impl EmbeddingCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the cache key for `text` under `model`.
    pub fn key(model: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Get an embedding from the cache, recording a hit or a miss.
    pub async fn get(&self, model: &str, text: &str) -> Option<Embedding> {
        let key = Self::key(model, text);
        let found = self.inner.entries.read().await.get(&key).cloned();
        let counter = if found.is_some() {
            &self.inner.hits
        } else {
            &self.inner.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store an embedding unless the key is already present.
    ///
    /// Returns the vector now held for the key.
    pub async fn put(&self, model: &str, text: &str, embedding: Embedding) -> Embedding {
        let key = Self::key(model, text);
        let mut entries = self.inner.entries.write().await;
        let stored = entries.entry(key).or_insert(embedding).clone();
        debug!("Cached embedding ({model}), {} entries", entries.len());
        stored
    }

    /// Check if an embedding is cached. Does not affect statistics.
    pub async fn contains(&self, model: &str, text: &str) -> bool {
        let key = Self::key(model, text);
        self.inner.entries.read().await.contains_key(&key)
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Clear all entries and reset statistics.
    pub async fn clear(&self) {
        self.inner.entries.write().await.clear();
        self.inner.hits.store(0, Ordering::Relaxed);
        self.inner.misses.store(0, Ordering::Relaxed);
        info!("Cleared embedding cache");
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len().await,
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Lookups that found an entry.
    pub hits: u64,

    /// Lookups that did not.
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cache_put_get() {
        let cache = EmbeddingCache::new();
        let embedding = vec![1.0, 2.0, 3.0];

        cache.put("model-1", "hello", embedding.clone()).await;

        assert_eq!(cache.get("model-1", "hello").await, Some(embedding));
        assert_eq!(cache.get("model-2", "hello").await, None);
    }

    #[tokio::test]
    async fn test_cache_is_write_once() {
        let cache = EmbeddingCache::new();
        cache.put("m", "text", vec![1.0]).await;
        let stored = cache.put("m", "text", vec![2.0]).await;

        assert_eq!(stored, vec![1.0]);
        assert_eq!(cache.get("m", "text").await, Some(vec![1.0]));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_keys_are_exact_text() {
        let cache = EmbeddingCache::new();
        cache.put("m", "Cell", vec![1.0]).await;

        assert!(cache.contains("m", "Cell").await);
        assert!(!cache.contains("m", "cell").await);
        assert!(!cache.contains("m", "Cell ").await);
    }

    #[tokio::test]
    async fn test_clones_share_storage_and_stats() {
        let cache = EmbeddingCache::new();
        let shared = cache.clone();
        shared.put("m", "a", vec![0.5]).await;

        assert_eq!(cache.get("m", "a").await, Some(vec![0.5]));
        assert_eq!(cache.get("m", "b").await, None);

        assert_eq!(
            shared.stats().await,
            CacheStats {
                entries: 1,
                hits: 1,
                misses: 1
            }
        );

        shared.clear().await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.stats().await, CacheStats::default());
    }

    #[test]
    fn test_key_separates_model_and_text() {
        assert_ne!(EmbeddingCache::key("ab", "c"), EmbeddingCache::key("a", "bc"));
        assert_eq!(EmbeddingCache::key("m", "t").len(), 64);
    }
}
