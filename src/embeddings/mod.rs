// Embeddings module
// Text-to-vector models behind a narrow trait, plus the reference persisted with each build

pub mod hashing;
pub mod ollama;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::Config;

pub use hashing::HashingEmbedder;
pub use ollama::OllamaClient;

/// Output dimension of the default sentence-embedding model (MiniLM-L6)
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;

/// Which backend produces embeddings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    Ollama,
    Hashing,
}

impl fmt::Display for EmbeddingProvider {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::Hashing => write!(f, "hashing"),
        }
    }
}

/// Enough information to reproduce the text-to-vector mapping used for a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModelRef {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
}

impl EmbeddingModelRef {
    /// Same provider and model name; dimension is compared separately at query time
    #[inline]
    pub fn same_model(&self, other: &Self) -> bool {
        self.provider == other.provider && self.model == other.model
    }
}

impl fmt::Display for EmbeddingModelRef {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({}d)", self.provider, self.model, self.dimension)
    }
}

/// A stateless mapping from text to a fixed-dimension vector
pub trait Embedder: Send + Sync {
    /// The reference recorded alongside artifacts built with this model
    fn model_ref(&self) -> EmbeddingModelRef;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, preserving input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Build the embedder selected by the configuration
#[inline]
pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embedding.provider {
        EmbeddingProvider::Ollama => {
            let client = OllamaClient::for_embeddings(config)
                .context("Failed to initialize Ollama embedding client")?;
            Ok(Arc::new(client))
        }
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(
            config.embedding.dimension as usize,
        ))),
    }
}
