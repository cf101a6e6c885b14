//! Configuration for the retrieval pipeline.
//!
//! Every field has a default, so a TOML file only needs the values it
//! changes:
//!
//! ```toml
//! context_budget = 24000
//! top_k = { proportional = { fraction = 0.2, max = 15 } }
//!
//! [chunking]
//! window_size = 1200
//! overlap = 150
//!
//! [embedding]
//! provider = "hashing"
//! dimension = 384
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use scholar_documents::ChunkerConfig;

use crate::error::{Result, RetrievalError};

/// Default context budget in characters.
pub const DEFAULT_CONTEXT_BUDGET: usize = 32_000;

/// Configuration for the retrieval pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunk window and overlap, in characters.
    pub chunking: ChunkerConfig,

    /// How many chunks a multi-document query retrieves.
    pub top_k: TopK,

    /// Maximum context length handed to the language model, in characters.
    pub context_budget: usize,

    /// Bounds on external calls.
    pub timeouts: TimeoutConfig,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Language model configuration.
    pub model: ModelConfig,
}

impl RetrievalConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded retrieval configuration from {}", path.display());
        Ok(config)
    }

    /// Set the chunking window and overlap.
    pub fn with_chunking(mut self, window_size: usize, overlap: usize) -> Self {
        self.chunking = ChunkerConfig {
            window_size,
            overlap,
        };
        self
    }

    pub fn with_top_k(mut self, top_k: TopK) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_context_budget(mut self, budget: usize) -> Self {
        self.context_budget = budget;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    /// Reject parameters the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        match self.top_k {
            TopK::Fixed(0) => return Err(config_error("top_k must be at least 1")),
            TopK::Proportional { max: 0, .. } => {
                return Err(config_error("top_k max must be at least 1"));
            }
            TopK::Proportional { fraction, .. } if !(fraction > 0.0 && fraction <= 1.0) => {
                return Err(config_error(format!(
                    "top_k fraction must be in (0, 1], got {fraction}"
                )));
            }
            _ => {}
        }

        if self.context_budget == 0 {
            return Err(config_error("context_budget must be greater than zero"));
        }
        if self.context_budget < self.chunking.window_size {
            return Err(config_error(format!(
                "context_budget ({}) must hold at least one chunk ({})",
                self.context_budget, self.chunking.window_size
            )));
        }

        let timeouts = &self.timeouts;
        if timeouts.fetch_secs == 0 || timeouts.embed_secs == 0 || timeouts.generate_secs == 0 {
            return Err(config_error("timeouts must be greater than zero"));
        }

        if self.embedding.dimension == Some(0) {
            return Err(config_error("embedding dimension must be greater than zero"));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> RetrievalError {
    RetrievalError::Config(message.into())
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkerConfig::default(),
            top_k: TopK::default(),
            context_budget: DEFAULT_CONTEXT_BUDGET,
            timeouts: TimeoutConfig::default(),
            embedding: EmbeddingConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

/// Number of chunks retrieved per multi-document query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopK {
    /// Always retrieve `k` chunks.
    Fixed(usize),

    /// Retrieve `floor(chunks * fraction)`, at least 1 and at most `max`.
    Proportional { fraction: f32, max: usize },
}

impl TopK {
    /// Resolve to a concrete `k` for a collection of `chunk_count` chunks.
    pub fn resolve(&self, chunk_count: usize) -> usize {
        match *self {
            TopK::Fixed(k) => k,
            TopK::Proportional { fraction, max } => {
                let scaled = (chunk_count as f32 * fraction).floor() as usize;
                scaled.clamp(1, max.max(1))
            }
        }
    }
}

impl Default for TopK {
    fn default() -> Self {
        TopK::Fixed(8)
    }
}

/// Bounds on external calls, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub fetch_secs: u64,
    pub embed_secs: u64,
    pub generate_secs: u64,
}

impl TimeoutConfig {
    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    pub fn embed(&self) -> Duration {
        Duration::from_secs(self.embed_secs)
    }

    pub fn generate(&self) -> Duration {
        Duration::from_secs(self.generate_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fetch_secs: 30,
            embed_secs: 60,
            generate_secs: 120,
        }
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to use for embeddings (provider default when unset).
    pub model: Option<String>,

    /// Output dimension (provider default when unset).
    pub dimension: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::OpenAI,
            model: None,
            dimension: None,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
    /// Offline feature hashing.
    Hashing,
}

/// Configuration for the language model client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible chat-completions API.
    pub base_url: String,

    /// Model used when a question names none.
    pub default_model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: crate::llm::DEFAULT_BASE_URL.to_string(),
            default_model: crate::llm::DEFAULT_MODEL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = RetrievalConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunking.window_size, 1000);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.top_k, TopK::Fixed(8));
        assert_eq!(config.context_budget, 32_000);
        assert_eq!(config.timeouts.generate(), Duration::from_secs(120));
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let invalid = vec![
            RetrievalConfig::default().with_chunking(0, 0),
            RetrievalConfig::default().with_chunking(500, 500),
            RetrievalConfig::default().with_top_k(TopK::Fixed(0)),
            RetrievalConfig::default().with_top_k(TopK::Proportional {
                fraction: 0.0,
                max: 10,
            }),
            RetrievalConfig::default().with_top_k(TopK::Proportional {
                fraction: 1.5,
                max: 10,
            }),
            RetrievalConfig::default().with_context_budget(0),
            RetrievalConfig::default().with_context_budget(999),
            RetrievalConfig::default().with_timeouts(TimeoutConfig {
                embed_secs: 0,
                ..Default::default()
            }),
        ];

        for config in invalid {
            let error = config.validate().unwrap_err();
            assert_eq!(
                error.stage(),
                crate::error::PipelineStage::Configuration,
                "{config:?}"
            );
        }
    }

    #[test]
    fn test_proportional_top_k() {
        let top_k = TopK::Proportional {
            fraction: 0.2,
            max: 15,
        };
        assert_eq!(top_k.resolve(3), 1);
        assert_eq!(top_k.resolve(15), 3);
        assert_eq!(top_k.resolve(49), 9);
        assert_eq!(top_k.resolve(500), 15);
        assert_eq!(TopK::Fixed(8).resolve(3), 8);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RetrievalConfig::from_toml_str(
            r#"
            context_budget = 4000
            top_k = { proportional = { fraction = 0.2, max = 15 } }

            [chunking]
            overlap = 200

            [embedding]
            provider = "hashing"
            dimension = 256
            "#,
        )
        .unwrap();

        assert_eq!(config.context_budget, 4000);
        assert_eq!(config.chunking.window_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(
            config.top_k,
            TopK::Proportional {
                fraction: 0.2,
                max: 15
            }
        );
        assert_eq!(config.embedding.provider, EmbeddingProviderType::Hashing);
        assert_eq!(config.embedding.dimension, Some(256));
        assert_eq!(config.timeouts, TimeoutConfig::default());
    }

    #[test]
    fn test_toml_is_validated() {
        let result = RetrievalConfig::from_toml_str("[chunking]\nwindow_size = 100\noverlap = 100\n");
        assert!(matches!(result, Err(RetrievalError::Chunker(_))));

        let result = RetrievalConfig::from_toml_str("context_budget = \"lots\"");
        assert!(matches!(result, Err(RetrievalError::Toml(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts]\nfetch_secs = 5").unwrap();

        let config = RetrievalConfig::load(file.path()).unwrap();
        assert_eq!(config.timeouts.fetch_secs, 5);
        assert_eq!(config.timeouts.embed_secs, 60);

        let missing = RetrievalConfig::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(RetrievalError::Io(_))));
    }
}
