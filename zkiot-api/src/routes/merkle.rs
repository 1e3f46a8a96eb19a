//! Merkle anchoring endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use zkiot_core::crypto::Digest32;

use crate::dto::{
    AnchorRequest, AnchorResponse, BatchResponse, ProofResponse, VerifyRequest, VerifyResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Assemble a batch from everything pending and anchor it on the active
/// network
pub async fn anchor(
    State(state): State<AppState>,
    Json(request): Json<AnchorRequest>,
) -> ApiResult<Json<AnchorResponse>> {
    let outcome = state
        .pipeline
        .anchor_now(request.metadata.unwrap_or_default(), &[])
        .await?;
    Ok(Json(AnchorResponse::new(&outcome.batch, outcome.dispatched)))
}

/// Verify an inclusion proof against a stored batch root
pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<Json<VerifyResponse>> {
    let report = state
        .pipeline
        .verify(request.batch_id, &request.leaf_hash, &request.proof)
        .await?;
    Ok(Json(VerifyResponse {
        valid: report.valid,
        confirmed_chains: report.confirmed_chains,
    }))
}

/// Most recent batches with their anchor records
pub async fn list_batches(State(state): State<AppState>) -> ApiResult<Json<Vec<BatchResponse>>> {
    let batches = state.pipeline.list_batches(100).await?;
    Ok(Json(batches.into_iter().map(BatchResponse::from).collect()))
}

/// One batch by id
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<u64>,
) -> ApiResult<Json<BatchResponse>> {
    let batch = state.pipeline.get_batch(batch_id).await?;
    Ok(Json(batch.into()))
}

/// Inclusion proof for a leaf in a batch
pub async fn inclusion_proof(
    State(state): State<AppState>,
    Path((batch_id, leaf_hash)): Path<(u64, String)>,
) -> ApiResult<Json<ProofResponse>> {
    let leaf = Digest32::from_hex(&leaf_hash)
        .map_err(|e| ApiError::BadRequest(format!("bad leaf hash: {}", e)))?;
    let batch = state.pipeline.get_batch(batch_id).await?;
    let proof = state.pipeline.inclusion_proof(batch_id, &leaf).await?;
    Ok(Json(ProofResponse {
        batch_id,
        leaf_hash: leaf,
        root: batch.root,
        proof,
    }))
}
