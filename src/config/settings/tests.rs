use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.embedding.provider, EmbeddingProvider::Ollama);
    assert_eq!(config.embedding.model, "all-minilm:latest");
    assert_eq!(config.embedding.batch_size, 32);
    assert_eq!(config.embedding.dimension, 384);
    assert_eq!(config.corpus.pairing, PairingPolicy::Interrogative);
    assert_eq!(config.retrieval.top_k, 1);
    assert_eq!(config.generative.max_context_tokens, 800);
    assert_eq!(config.generative.max_length, 1000);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.batch_size = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.dimension = 4;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.generative.max_context_tokens = 1000;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidContextWindow(1000, 1000))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn https_url_generation() {
    let mut config = Config::default();
    config.ollama.protocol = "https".to_string();
    config.ollama.host = "secure.example.com".to_string();
    config.ollama.port = 443;

    let url = config
        .ollama_url()
        .expect("should generate https url successfully");
    assert_eq!(url.as_str(), "https://secure.example.com/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_falls_back_to_defaults() {
    let partial_toml = r#"
        [embedding]
        provider = "hashing"
        dimension = 256

        [corpus]
        pairing = "alternating"
    "#;

    let config: Config = toml::from_str(partial_toml).expect("should parse partial toml");
    assert_eq!(config.embedding.provider, EmbeddingProvider::Hashing);
    assert_eq!(config.embedding.dimension, 256);
    assert_eq!(config.embedding.batch_size, 32);
    assert_eq!(config.corpus.pairing, PairingPolicy::Alternating);
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.retrieval.top_k, 1);
}

#[test]
fn setter_validation() {
    let mut ollama = OllamaConfig::default();

    assert!(ollama.set_protocol("https".to_string()).is_ok());
    assert!(ollama.set_host("example.com".to_string()).is_ok());
    assert!(ollama.set_port(8080).is_ok());

    assert!(ollama.set_protocol("ftp".to_string()).is_err());
    assert!(ollama.set_protocol("HTTP".to_string()).is_err());
    assert!(ollama.set_port(0).is_err());

    let mut embedding = EmbeddingConfig::default();
    assert!(embedding.set_model("nomic-embed-text:latest".to_string()).is_ok());
    assert!(embedding.set_batch_size(128).is_ok());
    assert!(embedding.set_dimension(768).is_ok());

    assert!(embedding.set_model("   ".to_string()).is_err());
    assert!(embedding.set_batch_size(0).is_err());
    assert!(embedding.set_batch_size(1001).is_err());
    assert!(embedding.set_dimension(5000).is_err());
    assert_eq!(embedding.dimension, 768);
}

#[test]
fn load_missing_config_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("should load default config");

    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.embedding, EmbeddingConfig::default());
    assert_eq!(config.artifacts_dir(), temp_dir.path().join("artifacts"));
}

#[test]
fn save_then_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let base_dir = temp_dir.path().join("nested");

    let mut config = Config {
        base_dir: base_dir.clone(),
        ..Config::default()
    };
    config.embedding.provider = EmbeddingProvider::Hashing;
    config.retrieval.top_k = 3;
    config.save().expect("should save config");

    assert!(base_dir.join("config.toml").exists());

    let loaded = Config::load(&base_dir).expect("should load saved config");
    assert_eq!(loaded, config);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[retrieval]\ntop_k = 0\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}
