use thiserror::Error;

use crate::artifacts::ArtifactError;

/// Failures of building or querying the retrieval index
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Cannot build an index from an empty corpus")]
    EmptyCorpus,

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("No index is loaded")]
    IndexNotLoaded,

    #[error("Query is empty")]
    EmptyQuery,

    #[error("Query embedding has dimension {query} but the index was built with {index}; rebuild the index")]
    DimensionMismatch { index: usize, query: usize },

    #[error("Top-k must be at least 1")]
    InvalidTopK,

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl RetrievalError {
    /// Whether the same request may succeed later without anyone changing it.
    ///
    /// Only the "nothing loaded yet" and transient embedding failures qualify;
    /// a dimension mismatch needs a rebuild.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::IndexNotLoaded | Self::EmbeddingFailure(_))
    }

    pub(crate) fn embedding(error: &anyhow::Error) -> Self {
        Self::EmbeddingFailure(format!("{error:#}"))
    }
}
