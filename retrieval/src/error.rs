//! Error types for the retrieval pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use scholar_documents::{ChunkerConfigError, ExtractionError, FetchError};
use scholar_embeddings::EmbeddingError;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// The pipeline stage an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Fetch,
    Extraction,
    Embedding,
    Model,
    Configuration,
    Query,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Fetch => "fetch",
            PipelineStage::Extraction => "extraction",
            PipelineStage::Embedding => "embedding",
            PipelineStage::Model => "model",
            PipelineStage::Configuration => "configuration",
            PipelineStage::Query => "query",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a language model client.
#[derive(Error, Debug)]
pub enum ModelError {
    /// No API key is available.
    #[error("language model API key not configured")]
    NotConfigured,

    /// The backend rejected the credentials.
    #[error("language model rejected credentials (status {status})")]
    Auth { status: u16 },

    /// Quota or rate limit exhausted.
    #[error("language model quota exceeded")]
    Quota,

    /// The backend did not answer in time.
    #[error("language model timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The backend answered without any text.
    #[error("language model returned an empty response")]
    EmptyResponse,

    /// Any other non-success status.
    #[error("language model request failed ({status}): {message}")]
    Status { status: u16, message: String },

    /// The response body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Transport-level failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors that can occur anywhere in the retrieval pipeline.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Fetching a source failed.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Extracting text from a source failed.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Embedding or indexing failed.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// The language model call failed.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid chunking parameters.
    #[error("configuration error: {0}")]
    Chunker(#[from] ChunkerConfigError),

    /// The configuration file could not be parsed.
    #[error("configuration error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A question was asked with no documents in the batch.
    #[error("no documents have been added")]
    NoDocuments,

    /// The question is empty or whitespace.
    #[error("query is empty")]
    EmptyQuery,
}

impl RetrievalError {
    /// The stage the error originated in.
    pub fn stage(&self) -> PipelineStage {
        match self {
            RetrievalError::Fetch(_) => PipelineStage::Fetch,
            RetrievalError::Extraction(_) => PipelineStage::Extraction,
            RetrievalError::Embedding(_) => PipelineStage::Embedding,
            RetrievalError::Model(_) => PipelineStage::Model,
            RetrievalError::Config(_)
            | RetrievalError::Chunker(_)
            | RetrievalError::Toml(_)
            | RetrievalError::Io(_) => PipelineStage::Configuration,
            RetrievalError::NoDocuments | RetrievalError::EmptyQuery => PipelineStage::Query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stage_of_wrapped_errors() {
        let cases: Vec<(RetrievalError, PipelineStage)> = vec![
            (
                FetchError::NotFound("https://example.org/x".to_string()).into(),
                PipelineStage::Fetch,
            ),
            (ExtractionError::Empty.into(), PipelineStage::Extraction),
            (
                EmbeddingError::Timeout { timeout_secs: 60 }.into(),
                PipelineStage::Embedding,
            ),
            (ModelError::Quota.into(), PipelineStage::Model),
            (ChunkerConfigError::ZeroWindow.into(), PipelineStage::Configuration),
            (RetrievalError::EmptyQuery, PipelineStage::Query),
        ];

        for (error, stage) in cases {
            assert_eq!(error.stage(), stage, "{error}");
        }
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(PipelineStage::Embedding.to_string(), "embedding");
    }
}
