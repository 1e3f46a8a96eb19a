//! API error types
//!
//! Maps the service taxonomy onto HTTP statuses. Responses carry the stable
//! machine code and a human message; nothing internal leaks through.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use zkiot_service::ServiceError;

/// API error
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("{0}")]
    BadRequest(String),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

fn status_for(code: &str) -> StatusCode {
    match code {
        "VALIDATION" => StatusCode::BAD_REQUEST,
        "NOT_FOUND" | "UNKNOWN_DEVICE" => StatusCode::NOT_FOUND,
        "DEVICE_EXISTS" | "ALREADY_EXISTS" | "CONFLICT_STATE" | "NO_PENDING" => {
            StatusCode::CONFLICT
        }
        "INACTIVE_DEVICE" | "FORBIDDEN" => StatusCode::FORBIDDEN,
        "BAD_PROOF" | "STALE_PROOF" | "REPLAY" | "UNAUTHENTICATED" => StatusCode::UNAUTHORIZED,
        "RPC_TRANSIENT" | "RPC_PERMANENT" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Service(err) => {
                let code = err.code();
                let state = match &err {
                    ServiceError::ConflictState { current, .. } => Some(current.clone()),
                    _ => None,
                };
                (
                    status_for(code),
                    ErrorResponse {
                        error: err.to_string(),
                        code: code.to_string(),
                        state,
                    },
                )
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: message,
                    code: "VALIDATION".to_string(),
                    state: None,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;
