// Engine module
// Answers queries against whichever artifact triple is currently installed

mod errors;

#[cfg(test)]
mod tests;

use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::artifacts::{self, ArtifactTriple};
use crate::embeddings::{Embedder, EmbeddingModelRef};

pub use errors::RetrievalError;

/// Lifecycle of the engine's triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
    Reloading,
    Failed,
}

impl fmt::Display for EngineState {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Reloading => "reloading",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One retrieved answer with where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedAnswer {
    pub answer: String,
    pub question: String,
    pub row: usize,
    pub distance: f32,
}

/// Snapshot of the engine for status reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub build_id: Option<Uuid>,
    pub records: usize,
    pub dimension: Option<usize>,
    pub model: Option<EmbeddingModelRef>,
}

pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    triple: RwLock<Option<Arc<ArtifactTriple>>>,
    state: RwLock<EngineState>,
    // Serialises loads so two reloads cannot interleave their state transitions
    load_lock: Mutex<()>,
}

impl QueryEngine {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            triple: RwLock::new(None),
            state: RwLock::new(EngineState::Unloaded),
            load_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn state(&self) -> EngineState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: EngineState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// The triple queries currently run against
    #[inline]
    pub fn snapshot(&self) -> Option<Arc<ArtifactTriple>> {
        self.triple
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    #[inline]
    pub fn status(&self) -> EngineStatus {
        let state = self.state();
        match self.snapshot() {
            Some(triple) => EngineStatus {
                state,
                build_id: Some(triple.build().build_id),
                records: triple.len(),
                dimension: Some(triple.dimension()),
                model: Some(triple.model().clone()),
            },
            None => EngineStatus {
                state,
                build_id: None,
                records: 0,
                dimension: None,
                model: None,
            },
        }
    }

    /// Read, verify and install the triple in `dir`.
    ///
    /// The previous triple keeps serving until the new one is fully verified.
    /// If loading fails and nothing was installed before, the engine ends in
    /// `Failed`; otherwise it stays `Ready` on the old triple.
    #[inline]
    pub fn load(&self, dir: &Path) -> Result<Arc<ArtifactTriple>, RetrievalError> {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let had_triple = self.snapshot().is_some();
        self.set_state(if had_triple {
            EngineState::Reloading
        } else {
            EngineState::Loading
        });

        match artifacts::load(dir) {
            Ok(triple) => Ok(self.swap(triple)),
            Err(e) => {
                if had_triple {
                    warn!(
                        "Reload from {} failed, keeping current index: {}",
                        dir.display(),
                        e
                    );
                    self.set_state(EngineState::Ready);
                } else {
                    error!("Initial load from {} failed: {}", dir.display(), e);
                    self.set_state(EngineState::Failed);
                }
                Err(e.into())
            }
        }
    }

    /// Same as [`QueryEngine::load`]; reads better at call sites that swap a live index
    #[inline]
    pub fn reload(&self, dir: &Path) -> Result<Arc<ArtifactTriple>, RetrievalError> {
        self.load(dir)
    }

    /// Install an in-memory triple, such as one just built
    #[inline]
    pub fn install(&self, triple: ArtifactTriple) -> Arc<ArtifactTriple> {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.swap(triple)
    }

    fn swap(&self, triple: ArtifactTriple) -> Arc<ArtifactTriple> {
        let configured = self.embedder.model_ref();
        if !triple.model().same_model(&configured) {
            warn!(
                "Index was built with {} but queries will use {}",
                triple.model(),
                configured
            );
        }

        let triple = Arc::new(triple);
        *self.triple.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&triple));
        self.set_state(EngineState::Ready);

        info!(
            "Serving build {} ({} records, {}d)",
            triple.build().build_id,
            triple.len(),
            triple.dimension()
        );
        triple
    }

    /// The `min(k, N)` closest QA records to `query`, nearest first
    #[inline]
    pub fn answer(&self, query: &str, k: usize) -> Result<Vec<RankedAnswer>, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        if k == 0 {
            return Err(RetrievalError::InvalidTopK);
        }

        let triple = self.snapshot().ok_or(RetrievalError::IndexNotLoaded)?;

        let vector = self
            .embedder
            .embed(query)
            .map_err(|e| RetrievalError::embedding(&e))?;

        if vector.len() != triple.dimension() {
            return Err(RetrievalError::DimensionMismatch {
                index: triple.dimension(),
                query: vector.len(),
            });
        }

        let neighbors = triple
            .index()
            .search(&vector, k)
            .map_err(|_| RetrievalError::DimensionMismatch {
                index: triple.dimension(),
                query: vector.len(),
            })?;

        let results: Vec<RankedAnswer> = neighbors
            .into_iter()
            .filter_map(|neighbor| {
                triple.record(neighbor.slot).map(|record| RankedAnswer {
                    answer: record.answer.clone(),
                    question: record.question.clone(),
                    row: neighbor.slot,
                    distance: neighbor.distance,
                })
            })
            .collect();

        debug!(
            "Query matched {} rows (best distance {:?})",
            results.len(),
            results.first().map(|r| r.distance)
        );
        Ok(results)
    }
}
