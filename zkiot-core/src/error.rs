//! Error types for core primitives

use thiserror::Error;

/// Core engine errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("digest error: {0}")]
    Digest(#[from] crate::crypto::hash::DigestError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
