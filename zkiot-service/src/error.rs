//! Service error taxonomy
//!
//! Every user-visible failure carries a stable machine code (uppercase
//! snake_case) and a human message. Internal details never cross this
//! boundary; the facade maps codes onto HTTP statuses.

use thiserror::Error;
use zkiot_core::crypto::AuthError;
use zkiot_core::error::CoreError;
use zkiot_chain::ChainError;
use zkiot_store::StoreError;

/// Errors surfaced by the service layer
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("device already registered: {0}")]
    DeviceExists(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("device is inactive: {0}")]
    InactiveDevice(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("proof verification failed")]
    BadProof,

    #[error("proof timestamp is outside the validity window")]
    StaleProof,

    #[error("proof was already used within its validity window")]
    Replay,

    #[error("invalid state: {message}")]
    ConflictState { current: String, message: String },

    #[error("no pending data to anchor")]
    NoPending,

    #[error("{0}")]
    RpcTransient(String),

    #[error("{0}")]
    RpcPermanent(String),

    #[error("{0}")]
    PersistConflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::UnknownDevice(_) => "UNKNOWN_DEVICE",
            ServiceError::DeviceExists(_) => "DEVICE_EXISTS",
            ServiceError::AlreadyExists(_) => "ALREADY_EXISTS",
            ServiceError::InactiveDevice(_) => "INACTIVE_DEVICE",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::Unauthenticated(_) => "UNAUTHENTICATED",
            ServiceError::BadProof => "BAD_PROOF",
            ServiceError::StaleProof => "STALE_PROOF",
            ServiceError::Replay => "REPLAY",
            ServiceError::ConflictState { .. } => "CONFLICT_STATE",
            ServiceError::NoPending => "NO_PENDING",
            ServiceError::RpcTransient(_) => "RPC_TRANSIENT",
            ServiceError::RpcPermanent(_) => "RPC_PERMANENT",
            ServiceError::PersistConflict(_) => "CONFLICT_STATE",
            ServiceError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::AlreadyExists(what) => ServiceError::AlreadyExists(what),
            StoreError::CasConflict(what) => ServiceError::PersistConflict(what),
            StoreError::Validation(what) => ServiceError::Validation(what),
            StoreError::Serialization(e) => ServiceError::Internal(e.to_string()),
            StoreError::Backend(e) => ServiceError::Internal(e),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::StaleProof => ServiceError::StaleProof,
            AuthError::UnknownDevice(id) => ServiceError::UnknownDevice(id),
            AuthError::InactiveDevice(id) => ServiceError::InactiveDevice(id),
            AuthError::BadProof => ServiceError::BadProof,
            AuthError::Replay => ServiceError::Replay,
            AuthError::UnsupportedScheme(name) => {
                ServiceError::Validation(format!("unsupported proof scheme: {}", name))
            }
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => ServiceError::Validation(msg),
            CoreError::Digest(e) => ServiceError::Validation(e.to_string()),
            CoreError::Serialization(e) => ServiceError::Internal(e.to_string()),
        }
    }
}

impl From<ChainError> for ServiceError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Transport(msg) => ServiceError::RpcTransient(msg),
            ChainError::UnknownNetwork(name) => {
                ServiceError::NotFound(format!("unknown network: {}", name))
            }
            other => ServiceError::RpcPermanent(other.to_string()),
        }
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
