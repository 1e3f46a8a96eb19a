//! Chain layer errors

use thiserror::Error;

/// Errors from RPC transport, transaction plumbing and the registry
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("connection failed: {0}")]
    Connect(String),

    /// Transient transport failure, retried with backoff inside the client
    #[error("transport error: {0}")]
    Transport(String),

    /// Error returned by the node itself
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("nonce too low")]
    NonceTooLow,

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("chain id mismatch: configured {expected}, node reports {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("no anchor contract configured for {0}")]
    MissingContract(String),
}

impl ChainError {
    /// Whether the error is worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport(_))
    }
}

/// Result type alias for chain operations
pub type ChainResult<T> = Result<T, ChainError>;
