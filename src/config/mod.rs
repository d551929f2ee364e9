// Configuration management module
// TOML settings for the embedding backend, generation budget and retrieval defaults

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, CorpusConfig, EmbeddingConfig, GenerativeConfig, OllamaConfig,
    RetrievalConfig,
};

/// Resolve the base directory, preferring an explicit override
#[inline]
pub fn resolve_base_dir(
    override_dir: Option<std::path::PathBuf>,
) -> Result<std::path::PathBuf, ConfigError> {
    match override_dir {
        Some(dir) => Ok(dir),
        None => Config::default_dir(),
    }
}
