use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Rerank error: {0}")]
    Rerank(String),

    #[error("Malformed document '{id}': {reason}")]
    MalformedDocument { id: String, reason: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Index '{index}' not found on collection '{collection}'")]
    IndexNotFound { collection: String, index: String },

    #[error("Index '{index}' already exists on collection '{collection}'")]
    IndexAlreadyExists { collection: String, index: String },

    #[error("Field '{field}' is not declared as a filter field of index '{index}'")]
    FilterFieldNotIndexed { index: String, field: String },

    #[error("Index '{index}' on collection '{collection}' not ready after {waited:?}")]
    IndexTimeout {
        collection: String,
        index: String,
        waited: Duration,
    },

    #[error("Index '{index}' on collection '{collection}' failed to build: {reason}")]
    IndexBuildFailed {
        collection: String,
        index: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod corpus;
pub mod database;
pub mod embeddings;
pub mod generation;
pub mod history;
pub mod pipeline;
pub mod rerank;
