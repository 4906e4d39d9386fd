//! Error types for model parsing.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while parsing identifiers out of raw data.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("malformed video filename: {0}")]
    MalformedFilename(String),

    #[error("malformed session key: {0}")]
    MalformedSessionKey(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}
