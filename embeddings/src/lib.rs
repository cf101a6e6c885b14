//! Embeddings for chunk retrieval.
//!
//! Text goes through an [`EmbeddingProvider`] (a remote OpenAI-compatible
//! API or the offline [`HashingProvider`]). The [`Embedder`] wraps a provider
//! with a shared, content-addressed [`EmbeddingCache`] and validates every
//! batch before anything is cached. Chunk vectors are held in a
//! [`VectorIndex`] and ranked against the query by cosine similarity.

pub mod cache;
pub mod embedder;
pub mod error;
pub mod index;
pub mod provider;
pub mod similarity;

pub use cache::{CacheStats, EmbeddingCache};
pub use embedder::Embedder;
pub use error::{EmbeddingError, Result};
pub use index::{IndexEntry, ScoredEntry, VectorIndex};
pub use provider::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, HashingProvider, OpenAIProvider,
};
pub use similarity::{SimilarityResult, cosine_similarity};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
