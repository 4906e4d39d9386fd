//! Error types for the coding pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for coding operations.
pub type CodingResult<T> = Result<T, CodingError>;

/// Errors that can occur in the coding pipeline.
#[derive(Debug, Error)]
pub enum CodingError {
    #[error(transparent)]
    Model(#[from] owlet_models::ModelError),

    #[error(transparent)]
    Media(#[from] owlet_media::MediaError),

    #[error(transparent)]
    Store(#[from] owlet_store::StoreError),

    #[error(transparent)]
    Client(#[from] owlet_client::ClientError),

    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    #[error("unknown coder: {0}")]
    UnknownCoder(String),

    #[error("no batch found for {0}")]
    UnknownBatch(String),

    #[error("coding sheet not found: {0}")]
    SheetMissing(PathBuf),

    #[error("column missing from coding sheet: {0}")]
    MissingColumn(String),

    #[error("remote record has unexpected shape: {0}")]
    BadRemoteRecord(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
