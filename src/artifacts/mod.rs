// Artifacts module
// The persisted output of a build: vectors, the model that produced them, and the QA table

pub mod consistency;
pub mod store;


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::corpus::QaRecord;
use crate::embeddings::EmbeddingModelRef;
use crate::index::{FlatL2Index, IndexError};

pub use consistency::{ConsistencyReport, verify};
pub use store::{load, save};

pub const INDEX_FILE: &str = "index.bin";
pub const MODEL_FILE: &str = "embedding_model.toml";
pub const QA_TABLE_FILE: &str = "qa_table.jsonl";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index file error: {0}")]
    Index(#[from] IndexError),

    #[error("Malformed {file}: {message}")]
    Format { file: &'static str, message: String },

    #[error("Checksum mismatch for {file}: manifest has {expected}, file hashes to {actual}")]
    ChecksumMismatch {
        file: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Index has {index_rows} rows but the QA table has {qa_rows}")]
    Misaligned { index_rows: usize, qa_rows: usize },

    #[error("Index dimension {index} does not match embedding model dimension {model}")]
    ModelDimension { index: usize, model: usize },
}

impl ArtifactError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(file: &'static str, message: impl ToString) -> Self {
        Self::Format {
            file,
            message: message.to_string(),
        }
    }

    /// The artifact directory (or one of its files) does not exist
    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Identity of one build, fixed when the triple is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub build_id: Uuid,
    pub built_at: DateTime<Utc>,
}

impl BuildInfo {
    #[inline]
    pub fn fresh() -> Self {
        Self {
            build_id: Uuid::new_v4(),
            built_at: Utc::now(),
        }
    }
}

/// SHA-256 digests (lowercase hex) of the three payload files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChecksums {
    pub index: String,
    pub model: String,
    pub qa_table: String,
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    #[serde(flatten)]
    pub build: BuildInfo,
    pub format_version: u32,
    pub records: usize,
    pub dimension: usize,
    pub checksums: FileChecksums,
}

/// Index, embedding model reference and QA table from one build.
///
/// Slot `i` of the index is the embedding of `qa_table[i].question` under
/// `model`; construction refuses anything that breaks that alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactTriple {
    index: FlatL2Index,
    model: EmbeddingModelRef,
    qa_table: Vec<QaRecord>,
    build: BuildInfo,
}

impl ArtifactTriple {
    #[inline]
    pub fn new(
        index: FlatL2Index,
        model: EmbeddingModelRef,
        qa_table: Vec<QaRecord>,
    ) -> Result<Self, ArtifactError> {
        Self::with_build(index, model, qa_table, BuildInfo::fresh())
    }

    #[inline]
    pub fn with_build(
        index: FlatL2Index,
        model: EmbeddingModelRef,
        qa_table: Vec<QaRecord>,
        build: BuildInfo,
    ) -> Result<Self, ArtifactError> {
        if index.len() != qa_table.len() {
            return Err(ArtifactError::Misaligned {
                index_rows: index.len(),
                qa_rows: qa_table.len(),
            });
        }
        if index.dimension() != model.dimension {
            return Err(ArtifactError::ModelDimension {
                index: index.dimension(),
                model: model.dimension,
            });
        }

        Ok(Self {
            index,
            model,
            qa_table,
            build,
        })
    }

    #[inline]
    pub fn index(&self) -> &FlatL2Index {
        &self.index
    }

    #[inline]
    pub fn model(&self) -> &EmbeddingModelRef {
        &self.model
    }

    #[inline]
    pub fn qa_table(&self) -> &[QaRecord] {
        &self.qa_table
    }

    #[inline]
    pub fn record(&self, slot: usize) -> Option<&QaRecord> {
        self.qa_table.get(slot)
    }

    #[inline]
    pub fn build(&self) -> BuildInfo {
        self.build
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.qa_table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.qa_table.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }
}
