//! Error types for monster-lab
//!
//! Every operation either fully succeeds or fails with one of these variants.
//! Nothing is retried or recovered locally.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// monster-lab error types
#[derive(Error, Debug)]
pub enum Error {
    /// Document store unavailable, closed, or write not acknowledged
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Training data empty, missing the label column, or not machine-interpretable
    #[error("Training error: {0}")]
    Training(String),

    /// Model not ready, or inference row does not match the training schema
    #[error("Prediction error: {0}")]
    Prediction(String),

    /// Serialized model missing, corrupt, or incompatible
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Invalid caller input (configuration, generator output, table projection)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Tabular snapshot error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
