use thiserror::Error;

pub type Result<T> = std::result::Result<T, GlucoError>;

#[derive(Error, Debug)]
pub enum GlucoError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] engine::RetrievalError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] artifacts::ArtifactError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod artifacts;
pub mod builder;
pub mod chat;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod engine;
pub mod index;
pub mod server;
