//! Error types for document ingestion.

use thiserror::Error;

/// Errors raised while turning raw content into text.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The PDF could not be parsed.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    /// The content type has no extractor.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The bytes could not be decoded as text.
    #[error("undecodable text: {0}")]
    Encoding(String),

    /// Extraction succeeded but produced no text.
    #[error("document contains no extractable text")]
    Empty,
}

/// Errors raised by a source fetcher.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The identifier is neither a DOI nor an http(s) URL.
    #[error("unsupported identifier scheme: {0}")]
    UnsupportedScheme(String),

    /// The identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The remote returned 404.
    #[error("source not found: {0}")]
    NotFound(String),

    /// The remote returned another non-success status.
    #[error("unexpected status {status} fetching {url}")]
    Status { status: u16, url: String },

    /// The response body was empty.
    #[error("empty response from {0}")]
    EmptyResponse(String),

    /// The request did not finish in time.
    #[error("fetch timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Invalid chunking parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkerConfigError {
    /// The window must hold at least one character.
    #[error("window size must be greater than zero")]
    ZeroWindow,

    /// The overlap must be strictly smaller than the window.
    #[error("overlap ({overlap}) must be less than window size ({window_size})")]
    OverlapTooLarge { window_size: usize, overlap: usize },
}
