use super::*;
use crate::embeddings::{EmbeddingProvider, HashingEmbedder};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Embeds successfully until `fail_after` texts have been seen
struct FlakyEmbedder {
    seen: AtomicUsize,
    fail_after: usize,
}

impl Embedder for FlakyEmbedder {
    fn model_ref(&self) -> EmbeddingModelRef {
        EmbeddingModelRef {
            provider: EmbeddingProvider::Ollama,
            model: "flaky".to_string(),
            dimension: 3,
        }
    }

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let seen = self.seen.fetch_add(1, Ordering::SeqCst);
        if seen >= self.fail_after {
            anyhow::bail!("connection refused");
        }
        Ok(vec![text.len() as f32, 1.0, 0.0])
    }
}

/// Returns vectors whose length depends on the text
struct RaggedEmbedder;

impl Embedder for RaggedEmbedder {
    fn model_ref(&self) -> EmbeddingModelRef {
        EmbeddingModelRef {
            provider: EmbeddingProvider::Ollama,
            model: "ragged".to_string(),
            dimension: 2,
        }
    }

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(vec![0.5; text.len()])
    }
}

fn records() -> Vec<QaRecord> {
    vec![
        QaRecord::new("What is diabetes?", "A condition of high blood glucose."),
        QaRecord::new("What is insulin?", "A hormone."),
        QaRecord::new("What is HbA1c?", "A three-month glucose average."),
    ]
}

#[test]
fn empty_corpus_is_rejected() {
    let embedder = HashingEmbedder::new(64);
    let result = IndexBuilder::new(&embedder).build(Vec::new());
    assert!(matches!(result, Err(RetrievalError::EmptyCorpus)));
}

#[test]
fn slots_follow_record_order() {
    let embedder = HashingEmbedder::new(64);
    let triple = IndexBuilder::new(&embedder)
        .with_batch_size(2)
        .build(records())
        .expect("should build");

    assert_eq!(triple.len(), 3);
    assert_eq!(triple.dimension(), 64);
    for (slot, record) in triple.qa_table().iter().enumerate() {
        let expected = embedder.embed(&record.question).expect("should embed");
        assert_eq!(triple.index().vector(slot), Some(expected.as_slice()));
    }
    assert_eq!(triple.model(), &embedder.model_ref());
}

#[test]
fn embedding_failure_aborts_build_and_persists_nothing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path().join("artifacts");
    let embedder = FlakyEmbedder {
        seen: AtomicUsize::new(0),
        fail_after: 2,
    };

    let result = IndexBuilder::new(&embedder)
        .with_batch_size(1)
        .build_and_persist(records(), &dir);

    let error = result.expect_err("should fail");
    assert!(matches!(error, RetrievalError::EmbeddingFailure(ref msg) if msg.contains("connection refused")));
    assert!(!dir.exists());
}

#[test]
fn failed_rebuild_leaves_previous_artifacts() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path().join("artifacts");
    let good = HashingEmbedder::new(32);
    let (first, _) = IndexBuilder::new(&good)
        .build_and_persist(records(), &dir)
        .expect("should build");

    let flaky = FlakyEmbedder {
        seen: AtomicUsize::new(0),
        fail_after: 1,
    };
    assert!(IndexBuilder::new(&flaky).build_and_persist(records(), &dir).is_err());

    let loaded = artifacts::load(&dir).expect("should still load");
    assert_eq!(loaded.build().build_id, first.build().build_id);
}

#[test]
fn inconsistent_dimensions_are_rejected() {
    let result = IndexBuilder::new(&RaggedEmbedder).build(records());
    assert!(matches!(result, Err(RetrievalError::EmbeddingFailure(_))));
}

#[test]
fn observed_dimension_is_recorded() {
    let embedder = FlakyEmbedder {
        seen: AtomicUsize::new(0),
        fail_after: usize::MAX,
    };
    let triple = IndexBuilder::new(&embedder)
        .build(records())
        .expect("should build");
    assert_eq!(triple.model().dimension, 3);
    assert_eq!(triple.model().model, "flaky");
}

#[test]
fn persisted_build_round_trips() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path().join("artifacts");
    let embedder = HashingEmbedder::new(48);

    let (triple, manifest) = IndexBuilder::new(&embedder)
        .with_progress(true)
        .build_and_persist(records(), &dir)
        .expect("should build");

    assert_eq!(manifest.records, 3);
    assert_eq!(manifest.build.build_id, triple.build().build_id);
    assert_eq!(artifacts::load(&dir).expect("should load"), triple);
}

#[test]
fn embedding_failure_abandons_progress_bar() {
    let embedder = FlakyEmbedder {
        seen: AtomicUsize::new(0),
        fail_after: 2,
    };
    let bar = ProgressBar::hidden();

    let result = IndexBuilder::new(&embedder)
        .with_batch_size(1)
        .with_progress_bar(bar.clone())
        .build(records());

    assert!(matches!(result, Err(RetrievalError::EmbeddingFailure(_))));
    assert!(bar.is_finished());
    assert_eq!(bar.position(), 2);
    assert_eq!(bar.length(), Some(3));
}

#[test]
fn ragged_vectors_abandon_progress_bar() {
    let bar = ProgressBar::hidden();

    let result = IndexBuilder::new(&RaggedEmbedder)
        .with_progress_bar(bar.clone())
        .build(records());

    assert!(result.is_err());
    assert!(bar.is_finished());
}
