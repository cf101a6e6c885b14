//! # Documents
//!
//! This crate turns user-submitted scholarly sources into bounded text units
//! ready for embedding.
//!
//! ## Features
//!
//! - **Source Fetching**: Resolve DOIs and URLs, or read uploaded files
//! - **Text Extraction**: PDF and plain-text sources to a single normalized string
//! - **Chunking**: Deterministic sliding windows with fixed overlap
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Document Ingestion                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  DocumentSource ──► RawContent ──► Document ──► Chunk           │
//! │       │                 │              │                        │
//! │       ▼                 ▼              ▼                        │
//! │  SourceFetcher     extract_text   SlidingWindowChunker          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod chunker;
pub mod document;
pub mod error;
pub mod extraction;
pub mod source;

pub use chunker::{ChunkerConfig, SlidingWindowChunker, chunk_text, reassemble};
pub use document::{Chunk, Document, DocumentId};
pub use error::{ChunkerConfigError, ExtractionError, FetchError};
pub use extraction::{RawContent, extract_document, extract_text, extract_title};
pub use source::{DocumentSource, HttpFetcher, SourceFetcher, normalize_doi};
