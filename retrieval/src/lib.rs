//! # Retrieval
//!
//! Question answering over a batch of scholarly documents.
//!
//! With one document in the batch the language model reads the whole text.
//! With two or more, the documents are chunked and embedded and only the
//! chunks most similar to the question are passed on.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Session                                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  DocumentSource ──► extract_text ──► Document batch             │
//! │                                           │                     │
//! │                                           ▼                     │
//! │                                   RetrievalRouter               │
//! │                             ┌─────────────┴─────────────┐       │
//! │                             ▼                           ▼       │
//! │                     Single-Document             Multi-Document  │
//! │                     (whole text)          (chunk, embed, top-k) │
//! │                             └─────────────┬─────────────┘       │
//! │                                           ▼                     │
//! │                                  LanguageModelClient            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scholar_retrieval::{ChatCompletionsClient, RetrievalConfig, Session, TechnicalLevel};
//! use scholar_documents::{DocumentSource, HttpFetcher};
//! use scholar_embeddings::EmbeddingCache;
//!
//! let mut session = Session::from_config(RetrievalConfig::default(), EmbeddingCache::new())?;
//! session.ingest(&DocumentSource::remote("10.1101/2023.07.19.549542"), &HttpFetcher::new()).await?;
//!
//! let answer = session
//!     .ask("What did the authors measure?", &ChatCompletionsClient::new(), TechnicalLevel::Undergrad, None)
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod router;
pub mod session;

pub use config::{
    EmbeddingConfig, EmbeddingProviderType, ModelConfig, RetrievalConfig, TimeoutConfig, TopK,
};
pub use error::{ModelError, PipelineStage, Result, RetrievalError};
pub use llm::{
    ChatCompletionsClient, DEFAULT_MODEL, GenerationRequest, KNOWN_MODELS, LanguageModelClient,
    TechnicalLevel,
};
pub use router::{RetrievalContext, RetrievalMode, RetrievalRouter, RetrievedChunk};
pub use session::{Answer, Session};

// Re-export from dependencies for convenience
pub use scholar_documents::{Chunk, Document, DocumentId, DocumentSource};
