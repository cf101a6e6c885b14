use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Failures while producing, caching or searching embeddings.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// No credentials for a remote provider.
    #[error("no API key configured for the embedding provider")]
    ProviderNotConfigured,

    #[error("embedding request rejected: {0}")]
    ApiRequest(String),

    #[error("malformed embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding provider is rate limiting; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// A vector does not have the width the index or embedder was built for.
    #[error("vector has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("provider returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("cannot embed input: {0}")]
    InvalidInput(String),

    #[error("embedding backend timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Failure reported by a custom [`EmbeddingProvider`] that fits no other
    /// variant.
    ///
    /// [`EmbeddingProvider`]: crate::EmbeddingProvider
    #[error("embedding backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
