use super::*;
use crate::builder::IndexBuilder;
use crate::corpus::QaRecord;
use crate::embeddings::{EmbeddingProvider, HashingEmbedder};
use std::fs;
use std::thread;
use tempfile::TempDir;

struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn model_ref(&self) -> EmbeddingModelRef {
        EmbeddingModelRef {
            provider: EmbeddingProvider::Ollama,
            model: "offline".to_string(),
            dimension: 384,
        }
    }

    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("Ollama is not running")
    }
}

fn corpus() -> Vec<QaRecord> {
    vec![
        QaRecord::new("What is diabetes?", "A chronic condition affecting blood sugar."),
        QaRecord::new("What is HbA1c?", "A measure of average blood glucose over time."),
        QaRecord::new("Can I eat fruit?", "Yes, in sensible portions."),
    ]
}

fn engine_with(dimension: usize) -> QueryEngine {
    let embedder = HashingEmbedder::new(dimension);
    let triple = IndexBuilder::new(&embedder)
        .build(corpus())
        .expect("should build");
    let engine = QueryEngine::new(Arc::new(embedder));
    engine.install(triple);
    engine
}

fn persist(dir: &Path, dimension: usize, records: Vec<QaRecord>) -> Uuid {
    let embedder = HashingEmbedder::new(dimension);
    let (triple, _) = IndexBuilder::new(&embedder)
        .build_and_persist(records, dir)
        .expect("should persist");
    triple.build().build_id
}

#[test]
fn new_engine_is_unloaded() {
    let engine = QueryEngine::new(Arc::new(HashingEmbedder::new(16)));
    assert_eq!(engine.state(), EngineState::Unloaded);
    assert!(matches!(
        engine.answer("What is diabetes?", 1),
        Err(RetrievalError::IndexNotLoaded)
    ));
    assert_eq!(engine.status().records, 0);
}

#[test]
fn empty_query_is_checked_before_state() {
    let engine = QueryEngine::new(Arc::new(HashingEmbedder::new(16)));
    assert!(matches!(
        engine.answer("   ", 1),
        Err(RetrievalError::EmptyQuery)
    ));
    assert!(matches!(engine.answer("", 1), Err(RetrievalError::EmptyQuery)));
}

#[test]
fn zero_k_is_rejected() {
    let engine = engine_with(384);
    assert!(matches!(
        engine.answer("What is diabetes?", 0),
        Err(RetrievalError::InvalidTopK)
    ));
}

#[test]
fn exact_question_returns_its_own_answer() {
    let engine = engine_with(384);
    for (row, record) in corpus().iter().enumerate() {
        let results = engine.answer(&record.question, 1).expect("should answer");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].row, row);
        assert_eq!(results[0].answer, record.answer);
        assert!(results[0].distance.abs() < 1e-6);
    }
}

#[test]
fn paraphrase_finds_the_hba1c_answer() {
    let engine = engine_with(384);
    let results = engine.answer("Tell me about HbA1c", 1).expect("should answer");
    assert_eq!(
        results[0].answer,
        "A measure of average blood glucose over time."
    );
    assert_eq!(results[0].question, "What is HbA1c?");
}

#[test]
fn results_are_sorted_and_truncated() {
    let engine = engine_with(384);
    let results = engine.answer("What is insulin?", 10).expect("should answer");
    assert_eq!(results.len(), 3);
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));

    let top_two = engine.answer("What is insulin?", 2).expect("should answer");
    assert_eq!(top_two, results[..2]);
}

#[test]
fn embedding_failure_surfaces_as_typed_error() {
    let engine = QueryEngine::new(Arc::new(BrokenEmbedder));
    let triple = IndexBuilder::new(&HashingEmbedder::new(384))
        .build(corpus())
        .expect("should build");
    engine.install(triple);

    let error = engine
        .answer("What is diabetes?", 1)
        .expect_err("should fail");
    assert!(matches!(error, RetrievalError::EmbeddingFailure(ref msg) if msg.contains("not running")));
    assert!(error.is_retryable());
}

#[test]
fn dimension_mismatch_is_fatal() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path().join("artifacts");
    persist(&dir, 768, corpus());

    let engine = QueryEngine::new(Arc::new(HashingEmbedder::new(384)));
    engine.load(&dir).expect("should load");

    let error = engine
        .answer("What is diabetes?", 1)
        .expect_err("should fail");
    assert!(matches!(
        error,
        RetrievalError::DimensionMismatch {
            index: 768,
            query: 384
        }
    ));
    assert!(!error.is_retryable());
}

#[test]
fn failed_initial_load_leaves_engine_failed() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = QueryEngine::new(Arc::new(HashingEmbedder::new(16)));

    assert!(engine.load(&temp_dir.path().join("missing")).is_err());
    assert_eq!(engine.state(), EngineState::Failed);
    assert!(matches!(
        engine.answer("What is diabetes?", 1),
        Err(RetrievalError::IndexNotLoaded)
    ));
}

#[test]
fn failed_reload_keeps_serving_previous_triple() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path().join("artifacts");
    let first = persist(&dir, 64, corpus());

    let engine = QueryEngine::new(Arc::new(HashingEmbedder::new(64)));
    engine.load(&dir).expect("should load");

    fs::write(dir.join(artifacts::INDEX_FILE), b"garbage").expect("should corrupt");
    let result = engine.reload(&dir);

    assert!(matches!(result, Err(RetrievalError::Artifact(_))));
    assert_eq!(engine.state(), EngineState::Ready);
    assert_eq!(engine.status().build_id, Some(first));
    assert!(engine.answer("What is diabetes?", 1).is_ok());
}

#[test]
fn reload_swaps_in_new_build() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path().join("artifacts");
    persist(&dir, 64, corpus());

    let engine = QueryEngine::new(Arc::new(HashingEmbedder::new(64)));
    engine.load(&dir).expect("should load");
    let held = engine.snapshot().expect("should have triple");

    let mut extended = corpus();
    extended.push(QaRecord::new("Is exercise good for me?", "Yes, regularly."));
    let second = persist(&dir, 64, extended);
    let swapped = engine.reload(&dir).expect("should reload");

    assert_eq!(swapped.build().build_id, second);
    assert_eq!(engine.status().records, 4);
    // a snapshot taken before the swap still sees the old build
    assert_eq!(held.len(), 3);
}

#[test]
fn concurrent_queries_share_the_engine() {
    let engine = Arc::new(engine_with(128));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let query = if i % 2 == 0 {
                    "What is diabetes?"
                } else {
                    "Can I eat fruit?"
                };
                engine.answer(query, 1).expect("should answer")[0].row
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let row = handle.join().expect("thread should finish");
        assert_eq!(row, if i % 2 == 0 { 0 } else { 2 });
    }
}

#[test]
fn status_reports_loaded_triple() {
    let engine = engine_with(32);
    let status = engine.status();
    assert_eq!(status.state, EngineState::Ready);
    assert_eq!(status.records, 3);
    assert_eq!(status.dimension, Some(32));
    assert_eq!(
        status.model.map(|m| m.provider),
        Some(EmbeddingProvider::Hashing)
    );
}
