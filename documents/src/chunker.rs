//! Sliding-window document chunking.
//!
//! Text is cut into fixed-size windows of `window_size` characters that
//! advance by `window_size - overlap` characters, so consecutive chunks share
//! exactly `overlap` characters. Only the final chunk may be shorter than the
//! window. Offsets are counted in characters, never bytes, so a window never
//! splits a multi-byte code point.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Chunk, Document};
use crate::error::ChunkerConfigError;

/// Configuration for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Window length in characters.
    pub window_size: usize,

    /// Characters shared by consecutive windows.
    pub overlap: usize,
}

impl ChunkerConfig {
    /// Create a validated configuration.
    pub fn new(window_size: usize, overlap: usize) -> Result<Self, ChunkerConfigError> {
        let config = Self {
            window_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check `window_size > 0` and `overlap < window_size`.
    pub fn validate(&self) -> Result<(), ChunkerConfigError> {
        if self.window_size == 0 {
            return Err(ChunkerConfigError::ZeroWindow);
        }
        if self.overlap >= self.window_size {
            return Err(ChunkerConfigError::OverlapTooLarge {
                window_size: self.window_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    /// Distance between the starts of consecutive windows.
    pub fn step(&self) -> usize {
        self.window_size - self.overlap
    }

    /// Number of chunks a text of `char_len` characters produces.
    pub fn expected_chunks(&self, char_len: usize) -> usize {
        if char_len == 0 {
            0
        } else if char_len <= self.window_size {
            1
        } else {
            1 + (char_len - self.window_size).div_ceil(self.step())
        }
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            window_size: 1000,
            overlap: 100,
        }
    }
}

/// Split `text` into `(start, end, slice)` windows, offsets in characters.
///
/// Empty text yields no windows. The configuration must already be valid.
pub fn chunk_text<'a>(text: &'a str, config: &ChunkerConfig) -> Vec<(usize, usize, &'a str)> {
    // Byte offset of every character boundary, including the end of the text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;

    let mut windows = Vec::with_capacity(config.expected_chunks(char_len));
    if char_len == 0 {
        return windows;
    }

    let step = config.step().max(1);
    let mut start = 0;
    loop {
        let end = (start + config.window_size).min(char_len);
        windows.push((start, end, &text[boundaries[start]..boundaries[end]]));
        if end == char_len {
            break;
        }
        start += step;
    }

    windows
}

/// Rebuild the original text from its chunks by dropping each chunk's overlap
/// with the text already emitted.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut emitted_to = 0usize;

    for chunk in chunks {
        let skip = emitted_to.saturating_sub(chunk.start);
        text.extend(chunk.text.chars().skip(skip));
        emitted_to = emitted_to.max(chunk.end);
    }

    text
}

/// Fixed-window chunker producing [`Chunk`]s tagged with their document.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindowChunker {
    config: ChunkerConfig,
}

impl SlidingWindowChunker {
    /// Create a chunker, validating the configuration.
    pub fn new(config: ChunkerConfig) -> Result<Self, ChunkerConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk a document in offset order.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = chunk_text(document.text(), &self.config)
            .into_iter()
            .map(|(start, end, text)| Chunk {
                document_id: document.id().clone(),
                start,
                end,
                text: text.to_string(),
            })
            .collect();

        debug!(
            "Chunked {} into {} chunks (window {}, overlap {})",
            document.id(),
            chunks.len(),
            self.config.window_size,
            self.config.overlap
        );
        chunks
    }

    /// Chunk several documents, preserving document order then offset order.
    pub fn chunk_all<'a>(&self, documents: impl IntoIterator<Item = &'a Document>) -> Vec<Chunk> {
        documents
            .into_iter()
            .flat_map(|document| self.chunk(document))
            .collect()
    }
}
