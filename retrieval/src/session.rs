//! Session-scoped question answering.
//!
//! A [`Session`] holds the documents a user is currently asking about and
//! the vector index built from them. The embedding cache can outlive one
//! session: hand the same [`EmbeddingCache`] to several sessions to share
//! vectors for identical chunks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use scholar_documents::{
    Chunk, Document, DocumentId, DocumentSource, FetchError, SourceFetcher, extract_document,
};
use scholar_embeddings::{
    Embedder, EmbeddingCache, EmbeddingProvider, HashingProvider, OpenAIProvider, VectorIndex,
};

use crate::config::{EmbeddingProviderType, RetrievalConfig};
use crate::error::{ModelError, Result};
use crate::llm::{GenerationRequest, LanguageModelClient, TechnicalLevel};
use crate::router::{RetrievalContext, RetrievalMode, RetrievalRouter};

/// An answer and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub mode: RetrievalMode,

    /// Documents the context drew on, best match first.
    pub sources: Vec<DocumentId>,

    /// Whether the context was cut to fit the budget.
    pub truncated: bool,
}

/// The current document batch and its retrieval state.
pub struct Session {
    config: RetrievalConfig,
    router: RetrievalRouter,
    documents: Vec<Document>,
    index: VectorIndex<Chunk>,
}

impl Session {
    /// Create a session around an embedder. The configuration is validated
    /// and its embed timeout applied to the embedder.
    pub fn new(config: RetrievalConfig, embedder: Embedder) -> Result<Self> {
        let embedder = embedder.with_timeout(config.timeouts.embed());
        let index = VectorIndex::new(embedder.dimension());
        let router = RetrievalRouter::new(embedder, &config)?;
        Ok(Self {
            config,
            router,
            documents: Vec::new(),
            index,
        })
    }

    /// Create a session with the embedding provider named in `config`.
    pub fn from_config(config: RetrievalConfig, cache: EmbeddingCache) -> Result<Self> {
        let embedding = &config.embedding;
        let provider: Arc<dyn EmbeddingProvider> = match embedding.provider {
            EmbeddingProviderType::OpenAI => {
                let mut provider = OpenAIProvider::new().with_timeout(config.timeouts.embed());
                if let Some(model) = &embedding.model {
                    provider = provider.with_model(model.clone());
                }
                Arc::new(provider)
            }
            EmbeddingProviderType::Hashing => Arc::new(match embedding.dimension {
                Some(dimension) => HashingProvider::new(dimension),
                None => HashingProvider::default(),
            }),
        };

        if !provider.is_available() {
            warn!("Embedding provider {} is not configured", provider.name());
        }

        let mut embedder = Embedder::new(provider).with_cache(cache);
        if let Some(model) = &embedding.model {
            embedder = embedder.with_model(model.clone());
        }
        if let Some(dimension) = embedding.dimension {
            embedder = embedder.with_dimension(dimension);
        }
        Self::new(config, embedder)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Embedder {
        self.router.embedder()
    }

    /// Documents in the batch, in the order they were added.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.iter().find(|d| d.id() == id)
    }

    /// The index as of the last multi-document query.
    pub fn index(&self) -> &VectorIndex<Chunk> {
        &self.index
    }

    /// Mode the next question will be answered in.
    pub fn mode(&self) -> Result<RetrievalMode> {
        RetrievalMode::for_document_count(self.documents.len())
    }

    /// Add a document, replacing any document with the same id in place.
    ///
    /// Returns the replaced document.
    pub fn add_document(&mut self, document: Document) -> Option<Document> {
        match self
            .documents
            .iter_mut()
            .find(|existing| existing.id() == document.id())
        {
            Some(existing) => {
                info!("Replacing document {}", document.id());
                Some(std::mem::replace(existing, document))
            }
            None => {
                info!("Added document {}", document.id());
                self.documents.push(document);
                None
            }
        }
    }

    pub fn remove_document(&mut self, id: &DocumentId) -> Option<Document> {
        let position = self.documents.iter().position(|d| d.id() == id)?;
        info!("Removed document {id}");
        Some(self.documents.remove(position))
    }

    /// End the batch: drop every document and the index. The embedding
    /// cache is kept.
    pub fn clear(&mut self) {
        self.documents.clear();
        self.index.clear();
        info!("Cleared session documents");
    }

    /// Fetch or read a source, extract its text and add it to the batch.
    pub async fn ingest(
        &mut self,
        source: &DocumentSource,
        fetcher: &dyn SourceFetcher,
    ) -> Result<DocumentId> {
        let id = source.id();
        let timeout = self.config.timeouts.fetch();

        let raw = tokio::time::timeout(timeout, source.read(fetcher))
            .await
            .map_err(|_| FetchError::Timeout {
                timeout_secs: timeout.as_secs(),
            })??;
        let document = extract_document(id.clone(), &raw)?;
        info!(
            "Ingested {id}: {} ({} words)",
            document.title().unwrap_or("untitled"),
            document.word_count()
        );

        self.add_document(document);
        Ok(id)
    }

    /// Assemble the context for `query` from the current batch.
    pub async fn context_for(&mut self, query: &str) -> Result<RetrievalContext> {
        self.router
            .answer_context(&self.documents, query, &mut self.index)
            .await
    }

    /// Answer `question` with `client`.
    ///
    /// `model_id` falls back to the configured default model.
    pub async fn ask(
        &mut self,
        question: &str,
        client: &dyn LanguageModelClient,
        technical_level: TechnicalLevel,
        model_id: Option<&str>,
    ) -> Result<Answer> {
        let context = self.context_for(question).await?;
        let sources = context.sources();

        let request = GenerationRequest {
            context: context.text,
            question: question.trim().to_string(),
            technical_level,
            model_id: model_id
                .unwrap_or(self.config.model.default_model.as_str())
                .to_string(),
        };

        let timeout = self.config.timeouts.generate();
        let text = tokio::time::timeout(timeout, client.generate(&request))
            .await
            .map_err(|_| ModelError::Timeout {
                timeout_secs: timeout.as_secs(),
            })??;

        Ok(Answer {
            text,
            mode: context.mode,
            sources,
            truncated: context.truncated,
        })
    }
}
