// Builder module
// Turns an ordered QA table into an artifact triple; nothing is written unless every step succeeds

#[cfg(test)]
mod tests;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::artifacts::{self, ArtifactManifest, ArtifactTriple};
use crate::corpus::QaRecord;
use crate::embeddings::{Embedder, EmbeddingModelRef};
use crate::engine::RetrievalError;
use crate::index::FlatL2Index;

const DEFAULT_BATCH_SIZE: usize = 32;

pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    batch_size: usize,
    progress: bool,
    bar: Option<ProgressBar>,
}

impl<'a> IndexBuilder<'a> {
    #[inline]
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
            progress: false,
            bar: None,
        }
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Show a progress bar on stderr when a person is watching
    #[inline]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Report progress on `bar`, such as one owned by a `MultiProgress`
    #[inline]
    pub fn with_progress_bar(mut self, bar: ProgressBar) -> Self {
        self.bar = Some(bar);
        self
    }

    /// Embed every question, in order, and assemble the triple in memory
    #[inline]
    pub fn build(&self, records: Vec<QaRecord>) -> Result<ArtifactTriple, RetrievalError> {
        if records.is_empty() {
            return Err(RetrievalError::EmptyCorpus);
        }

        let declared = self.embedder.model_ref();
        info!(
            "Building index over {} records with {}",
            records.len(),
            declared
        );

        let bar = self.progress_bar(records.len());
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(records.len());

        for batch in records.chunks(self.batch_size) {
            let questions: Vec<String> = batch.iter().map(|r| r.question.clone()).collect();
            let embedded = match self.embedder.embed_batch(&questions) {
                Ok(embedded) => embedded,
                Err(e) => {
                    bar.abandon();
                    return Err(RetrievalError::embedding(&e));
                }
            };

            if embedded.len() != batch.len() {
                bar.abandon();
                return Err(RetrievalError::EmbeddingFailure(format!(
                    "embedder returned {} vectors for {} questions",
                    embedded.len(),
                    batch.len()
                )));
            }

            for vector in embedded {
                let expected = vectors.first().map_or(vector.len(), Vec::len);
                if vector.is_empty() || vector.len() != expected {
                    bar.abandon();
                    return Err(RetrievalError::EmbeddingFailure(format!(
                        "row {} embedded to {} dimensions, expected {}",
                        vectors.len(),
                        vector.len(),
                        expected
                    )));
                }
                vectors.push(vector);
            }

            bar.inc(batch.len() as u64);
            debug!("Embedded {}/{} questions", vectors.len(), records.len());
        }
        bar.finish_and_clear();

        let dimension = vectors.first().map_or(0, Vec::len);
        if dimension != declared.dimension {
            warn!(
                "Model {} produced {}-dimensional vectors; recording the observed dimension",
                declared, dimension
            );
        }
        let model = EmbeddingModelRef {
            dimension,
            ..declared
        };

        let index = FlatL2Index::from_vectors(dimension, &vectors)
            .map_err(|e| RetrievalError::EmbeddingFailure(e.to_string()))?;
        let triple = ArtifactTriple::new(index, model, records)?;

        info!(
            "Built index {} with {} vectors of dimension {}",
            triple.build().build_id,
            triple.len(),
            triple.dimension()
        );
        Ok(triple)
    }

    /// Build fully in memory, then replace the artifacts in `dir` in one step
    #[inline]
    pub fn build_and_persist(
        &self,
        records: Vec<QaRecord>,
        dir: &Path,
    ) -> Result<(ArtifactTriple, ArtifactManifest), RetrievalError> {
        let triple = self.build(records)?;
        let manifest = artifacts::save(&triple, dir)?;
        Ok((triple, manifest))
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if let Some(bar) = &self.bar {
            bar.set_length(total as u64);
            return bar.clone();
        }
        if self.progress && console::user_attended_stderr() {
            let style = ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding questions")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            ProgressBar::new(total as u64).with_style(style)
        } else {
            ProgressBar::hidden()
        }
    }
}
