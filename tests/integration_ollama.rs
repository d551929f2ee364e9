#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Build and query through the Ollama client against a mock Ollama server.
// Embeddings are served by the hashing embedder so results are predictable.

use glucomate_qa::builder::IndexBuilder;
use glucomate_qa::config::{Config, OllamaConfig};
use glucomate_qa::corpus::QaRecord;
use glucomate_qa::embeddings::{
    Embedder, EmbeddingProvider, HashingEmbedder, OllamaClient, create_embedder,
};
use glucomate_qa::engine::{QueryEngine, RetrievalError};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const MOCK_DIMENSION: usize = 64;

/// Answers `/api/embed` like Ollama would, using hashed bag-of-words vectors
struct HashedEmbeddings(HashingEmbedder);

impl Respond for HashedEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|text| self.0.embed(text).expect("hashing never fails"))
                    .collect()
            })
            .unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({
            "model": body["model"],
            "embeddings": embeddings,
        }))
    }
}

async fn mock_ollama() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(HashedEmbeddings(HashingEmbedder::new(MOCK_DIMENSION)))
        .mount(&server)
        .await;
    server
}

fn config_for(server: &MockServer) -> Config {
    let address = server.address();
    let mut config = Config::default();
    config.ollama = OllamaConfig {
        protocol: "http".to_string(),
        host: address.ip().to_string(),
        port: address.port(),
    };
    config.embedding.provider = EmbeddingProvider::Ollama;
    config.embedding.model = "all-minilm:latest".to_string();
    config.embedding.dimension = MOCK_DIMENSION as u32;
    config.embedding.batch_size = 2;
    config
}

fn faq() -> Vec<QaRecord> {
    vec![
        QaRecord::new("What is diabetes?", "A chronic condition affecting blood sugar."),
        QaRecord::new("What is HbA1c?", "A measure of average blood glucose over time."),
        QaRecord::new("Can I eat fruit?", "Yes, in sensible portions."),
    ]
}

#[tokio::test]
async fn build_and_query_through_ollama() {
    let server = mock_ollama().await;
    let config = config_for(&server);
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path().join("artifacts");

    let results = tokio::task::spawn_blocking(move || {
        let embedder = create_embedder(&config).expect("should create embedder");
        let (triple, _) = IndexBuilder::new(embedder.as_ref())
            .with_batch_size(config.embedding.batch_size as usize)
            .build_and_persist(faq(), &dir)
            .expect("should build");
        assert_eq!(triple.model().provider, EmbeddingProvider::Ollama);
        assert_eq!(triple.model().model, "all-minilm:latest");
        assert_eq!(triple.dimension(), MOCK_DIMENSION);

        let engine = QueryEngine::new(embedder);
        engine.load(&dir).expect("should load");
        engine.answer("Tell me about HbA1c", 3)
    })
    .await
    .expect("should join")
    .expect("should answer");

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].row, 1);

    // three records in batches of two, plus the query
    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn unreachable_ollama_aborts_build_without_artifacts() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path().join("artifacts");
    let ollama = OllamaConfig {
        protocol: "http".to_string(),
        host: "127.0.0.1".to_string(),
        port: 9,
    };

    let (result, dir) = tokio::task::spawn_blocking(move || {
        let client = OllamaClient::new(&ollama, "all-minilm:latest")
            .expect("should create client")
            .with_retry_attempts(1);
        let result = IndexBuilder::new(&client).build_and_persist(faq(), &dir);
        (result.map(|_| ()), dir)
    })
    .await
    .expect("should join");

    assert!(matches!(result, Err(RetrievalError::EmbeddingFailure(_))));
    assert!(!dir.exists());
}

#[tokio::test]
async fn server_errors_during_query_are_retryable() {
    let server = mock_ollama().await;
    let config = config_for(&server);

    let engine = tokio::task::spawn_blocking(move || {
        let client = OllamaClient::for_embeddings(&config)
            .expect("should create client")
            .with_retry_attempts(1);
        let triple = IndexBuilder::new(&client)
            .build(faq())
            .expect("should build");
        let engine = QueryEngine::new(Arc::new(client));
        engine.install(triple);
        engine
    })
    .await
    .expect("should join");

    server.reset().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let error = tokio::task::spawn_blocking(move || engine.answer("What is diabetes?", 1))
        .await
        .expect("should join")
        .expect_err("should fail");

    assert!(matches!(error, RetrievalError::EmbeddingFailure(_)));
    assert!(error.is_retryable());
}
