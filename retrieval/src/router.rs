//! Retrieval routing.
//!
//! The router decides how much of the document batch the language model
//! sees for one question:
//!
//! - **Single-Document**: exactly one document. Its whole text is the
//!   context, cut at the context budget with a notice when it is too long.
//!   Nothing is chunked or embedded.
//! - **Multi-Document**: two or more documents. Every document is chunked
//!   and embedded, the vector index is rebuilt from the result, and the
//!   top-k chunks across all documents become the context, best match
//!   first, each annotated with the document it came from.
//!
//! The mode is a pure function of the document count, so adding or removing
//! documents switches it on the next question.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use scholar_documents::{Chunk, Document, DocumentId, SlidingWindowChunker};
use scholar_embeddings::{Embedder, IndexEntry, VectorIndex};

use crate::config::{RetrievalConfig, TopK};
use crate::error::{Result, RetrievalError};

/// Separator between chunk sections in a multi-document context.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// How a question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    SingleDocument,
    MultiDocument,
}

impl RetrievalMode {
    /// Select the mode for a batch of `count` documents.
    pub fn for_document_count(count: usize) -> Result<Self> {
        match count {
            0 => Err(RetrievalError::NoDocuments),
            1 => Ok(RetrievalMode::SingleDocument),
            _ => Ok(RetrievalMode::MultiDocument),
        }
    }
}

/// A chunk selected for the context, with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// The context assembled for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalContext {
    pub mode: RetrievalMode,

    /// Text handed to the language model.
    pub text: String,

    /// Chunks included in `text`, best match first.
    pub chunks: Vec<RetrievedChunk>,

    /// Whether anything was cut to fit the context budget.
    pub truncated: bool,
}

impl RetrievalContext {
    /// Documents the context draws on, in rank order without repeats.
    pub fn sources(&self) -> Vec<DocumentId> {
        let mut sources: Vec<DocumentId> = Vec::new();
        for retrieved in &self.chunks {
            if !sources.contains(&retrieved.chunk.document_id) {
                sources.push(retrieved.chunk.document_id.clone());
            }
        }
        sources
    }
}

/// Routes a question to single- or multi-document retrieval.
pub struct RetrievalRouter {
    embedder: Embedder,
    chunker: SlidingWindowChunker,
    top_k: TopK,
    context_budget: usize,
}

impl RetrievalRouter {
    /// Create a router. The configuration is validated.
    pub fn new(embedder: Embedder, config: &RetrievalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            embedder,
            chunker: SlidingWindowChunker::new(config.chunking)?,
            top_k: config.top_k,
            context_budget: config.context_budget,
        })
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn context_budget(&self) -> usize {
        self.context_budget
    }

    /// Build the context for `query` over `documents`.
    ///
    /// In multi-document mode `index` is rebuilt from the current documents.
    /// If chunk or query embedding fails, `index` keeps its previous
    /// contents.
    pub async fn answer_context(
        &self,
        documents: &[Document],
        query: &str,
        index: &mut VectorIndex<Chunk>,
    ) -> Result<RetrievalContext> {
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let mode = RetrievalMode::for_document_count(documents.len())?;
        info!("Answering over {} documents ({mode:?})", documents.len());

        match documents {
            [document] => {
                index.clear();
                Ok(self.single_document(document))
            }
            _ => self.multi_document(documents, query, index).await,
        }
    }

    fn single_document(&self, document: &Document) -> RetrievalContext {
        let total = document.char_len();
        let budget = self.context_budget;

        if total <= budget {
            return RetrievalContext {
                mode: RetrievalMode::SingleDocument,
                text: document.text().to_string(),
                chunks: vec![whole_document(document, 0, total, document.text())],
                truncated: false,
            };
        }

        let cut = document
            .text()
            .char_indices()
            .nth(budget)
            .map_or(document.text().len(), |(i, _)| i);
        let kept = &document.text()[..cut];
        debug!("Truncating {} from {total} to {budget} characters", document.id());

        RetrievalContext {
            mode: RetrievalMode::SingleDocument,
            text: format!("{kept}{SECTION_SEPARATOR}{}", truncation_notice(budget, total)),
            chunks: vec![whole_document(document, 0, budget, kept)],
            truncated: true,
        }
    }

    async fn multi_document(
        &self,
        documents: &[Document],
        query: &str,
        index: &mut VectorIndex<Chunk>,
    ) -> Result<RetrievalContext> {
        let chunks = self.chunker.chunk_all(documents);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();

        let vectors = self.embedder.embed_batch(texts.as_slice()).await?;
        let query_vector = self.embedder.embed(query).await?;

        index.build(
            vectors
                .into_iter()
                .zip(chunks)
                .map(|(vector, chunk)| IndexEntry::new(vector, chunk)),
        )?;

        let k = self.top_k.resolve(index.len());
        let ranked: Vec<RetrievedChunk> = index
            .query(&query_vector, k)?
            .into_iter()
            .map(|hit| RetrievedChunk {
                chunk: hit.payload.clone(),
                score: hit.score,
            })
            .collect();

        debug!(
            "Retrieved {} of {} chunks (k = {k})",
            ranked.len(),
            index.len()
        );

        let (text, chunks, truncated) = assemble_context(ranked, self.context_budget);
        Ok(RetrievalContext {
            mode: RetrievalMode::MultiDocument,
            text,
            chunks,
            truncated,
        })
    }
}

fn whole_document(document: &Document, start: usize, end: usize, text: &str) -> RetrievedChunk {
    RetrievedChunk {
        chunk: Chunk {
            document_id: document.id().clone(),
            start,
            end,
            text: text.to_string(),
        },
        score: 1.0,
    }
}

/// Notice appended to a single document cut at the context budget.
pub fn truncation_notice(shown: usize, total: usize) -> String {
    format!("[Truncated: showing the first {shown} of {total} characters]")
}

/// Render one ranked chunk with its source annotation.
pub fn format_section(chunk: &Chunk) -> String {
    format!("[Source: {}]\n{}", chunk.document_id, chunk.text)
}

/// Join ranked chunks into a context of at most `budget` characters.
///
/// Sections are added best match first until the next one would overflow the
/// budget; everything from there down is dropped. The best match is always
/// kept. Returns the text, the chunks it contains, and whether any were
/// dropped.
pub fn assemble_context(
    ranked: Vec<RetrievedChunk>,
    budget: usize,
) -> (String, Vec<RetrievedChunk>, bool) {
    let available = ranked.len();
    let separator_len = SECTION_SEPARATOR.chars().count();
    let mut text = String::new();
    let mut used = 0usize;
    let mut kept = Vec::with_capacity(available);

    for retrieved in ranked {
        let section = format_section(&retrieved.chunk);
        let section_len = section.chars().count();
        let cost = if kept.is_empty() {
            section_len
        } else {
            section_len + separator_len
        };

        if !kept.is_empty() && used + cost > budget {
            break;
        }
        if !kept.is_empty() {
            text.push_str(SECTION_SEPARATOR);
        }
        text.push_str(&section);
        used += cost;
        kept.push(retrieved);
    }

    let truncated = kept.len() < available;
    if truncated {
        debug!(
            "Context budget {budget} kept {} of {available} chunks",
            kept.len()
        );
    }
    (text, kept, truncated)
}
