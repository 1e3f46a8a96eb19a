//! Cross-chain anchoring endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use zkiot_core::crypto::Digest32;
use zkiot_service::{ServiceError, SyncStatus};

use crate::dto::{AnchorResponse, CrossChainAnchorRequest};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Anchor everything pending to an explicit chain set
///
/// Partial success is a 200: the caller inspects the per-chain arrays.
pub async fn anchor(
    State(state): State<AppState>,
    Json(request): Json<CrossChainAnchorRequest>,
) -> ApiResult<Json<AnchorResponse>> {
    if request.targets.is_empty() {
        return Err(ServiceError::Validation("targets must not be empty".to_string()).into());
    }
    let outcome = state
        .pipeline
        .anchor_now(request.metadata.unwrap_or_default(), &request.targets)
        .await?;
    Ok(Json(AnchorResponse::new(&outcome.batch, outcome.dispatched)))
}

/// Per-chain anchor status for a root
pub async fn status(
    State(state): State<AppState>,
    Path(root): Path<String>,
) -> ApiResult<Json<SyncStatus>> {
    let root = Digest32::from_hex(&root)
        .map_err(|e| ApiError::BadRequest(format!("bad root: {}", e)))?;
    Ok(Json(state.dispatcher.sync_status(&root).await?))
}

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    pub batch_id: u64,
    pub chain: String,
}

/// Operator retry of a failed chain
pub async fn retry(
    State(state): State<AppState>,
    Json(request): Json<RetryRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let entry = state
        .dispatcher
        .retry_chain(request.batch_id, &request.chain)
        .await?;
    Ok(Json(serde_json::json!({
        "batch_id": request.batch_id,
        "chain": entry.chain,
        "tx_hash": entry.tx_hash,
        "error": entry.error,
    })))
}
