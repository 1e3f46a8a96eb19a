//! Multi-sig proposal endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use zkiot_core::types::{MultiSigProposal, Signer};

use crate::dto::{
    AddSignerRequest, ExecuteResponse, ProposalFilter, ProposeRequest, ProposeResponse,
    VoteRequest, VoteResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

fn vote_response(proposal: &MultiSigProposal) -> VoteResponse {
    VoteResponse {
        proposal_id: proposal.proposal_id.clone(),
        state: proposal.state,
        approvals: proposal.approvals.len(),
        rejections: proposal.rejections.len(),
        required_approvals: proposal.required_approvals,
    }
}

/// Create a proposal
pub async fn propose(
    State(state): State<AppState>,
    Json(request): Json<ProposeRequest>,
) -> ApiResult<(StatusCode, Json<ProposeResponse>)> {
    let proposal = state
        .multisig
        .propose(
            request.kind,
            request.payload,
            request.required_approvals,
            &request.proposer,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ProposeResponse {
            proposal_id: proposal.proposal_id,
            expires_at: proposal.expires_at,
        }),
    ))
}

/// Approve a pending proposal
pub async fn approve(
    State(state): State<AppState>,
    Json(request): Json<VoteRequest>,
) -> ApiResult<Json<VoteResponse>> {
    let proposal = state
        .multisig
        .approve(&request.proposal_id, &request.signer_id, &request.signature)
        .await?;
    Ok(Json(vote_response(&proposal)))
}

/// Reject a pending proposal
pub async fn reject(
    State(state): State<AppState>,
    Json(request): Json<VoteRequest>,
) -> ApiResult<Json<VoteResponse>> {
    let proposal = state
        .multisig
        .reject(&request.proposal_id, &request.signer_id, &request.signature)
        .await?;
    Ok(Json(vote_response(&proposal)))
}

/// Execute an approved proposal
pub async fn execute(
    State(state): State<AppState>,
    Path(proposal_id): Path<String>,
) -> ApiResult<Json<ExecuteResponse>> {
    let proposal = state.multisig.execute(&proposal_id).await?;
    Ok(Json(ExecuteResponse {
        executed: true,
        artifact: proposal.artifact.unwrap_or_default(),
    }))
}

/// List proposals, optionally filtered by state
pub async fn list_proposals(
    State(state): State<AppState>,
    Query(filter): Query<ProposalFilter>,
) -> ApiResult<Json<Vec<MultiSigProposal>>> {
    Ok(Json(state.multisig.list_proposals(filter.state).await?))
}

/// One proposal by id
pub async fn get_proposal(
    State(state): State<AppState>,
    Path(proposal_id): Path<String>,
) -> ApiResult<Json<MultiSigProposal>> {
    Ok(Json(state.multisig.get_proposal(&proposal_id).await?))
}

/// List signers (active and retired)
pub async fn list_signers(State(state): State<AppState>) -> ApiResult<Json<Vec<Signer>>> {
    Ok(Json(state.multisig.list_signers().await?))
}

/// Authorize a signer
pub async fn add_signer(
    State(state): State<AppState>,
    Json(request): Json<AddSignerRequest>,
) -> ApiResult<(StatusCode, Json<Signer>)> {
    let signer = state
        .multisig
        .add_signer(&request.signer_id, &request.public_key)
        .await?;
    Ok((StatusCode::CREATED, Json(signer)))
}

/// Soft-remove a signer, preserving its audit trail
pub async fn deactivate_signer(
    State(state): State<AppState>,
    Path(signer_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.multisig.deactivate_signer(&signer_id).await?;
    Ok(Json(serde_json::json!({ "signer_id": signer_id, "is_active": false })))
}
