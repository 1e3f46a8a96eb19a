//! Device registration, authentication and telemetry endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use zkiot_core::crypto::AuthProof;
use zkiot_service::RegisterDevice;

use crate::dto::{
    AuthenticateResponse, DeviceResponse, RegisterDeviceResponse, SubmitDataRequest,
    SubmitDataResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// Register a new device
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterDevice>,
) -> ApiResult<(StatusCode, Json<RegisterDeviceResponse>)> {
    let device = state.auth.register(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterDeviceResponse {
            device_id: device.device_id,
            public_commitment: device.public_commitment,
        }),
    ))
}

/// Verify an authentication proof
pub async fn authenticate(
    State(state): State<AppState>,
    Json(proof): Json<AuthProof>,
) -> ApiResult<Json<AuthenticateResponse>> {
    let at = state.auth.authenticate(&proof).await?;
    Ok(Json(AuthenticateResponse { ok: true, at }))
}

/// Submit telemetry into the pending bucket
pub async fn submit_data(
    State(state): State<AppState>,
    Json(request): Json<SubmitDataRequest>,
) -> ApiResult<(StatusCode, Json<SubmitDataResponse>)> {
    let outcome = state
        .auth
        .submit_data(&request.device_id, request.payload)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitDataResponse {
            accepted: true,
            datum_id: outcome.datum.datum_id,
            leaf_hash: outcome.datum.leaf_hash,
            pending_count: outcome.pending_count,
        }),
    ))
}

/// All registered devices
pub async fn list_devices(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<DeviceResponse>>> {
    let devices = state.auth.list_devices().await?;
    Ok(Json(devices.into_iter().map(DeviceResponse::from).collect()))
}

/// One device by id
pub async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<DeviceResponse>> {
    let device = state.auth.get_device(&device_id).await?;
    Ok(Json(device.into()))
}

/// Recent submissions of one device
pub async fn device_data(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Vec<serde_json::Value>>> {
    let data = state.auth.device_data(&device_id, 100).await?;
    Ok(Json(
        data.into_iter()
            .map(|d| {
                serde_json::json!({
                    "datum_id": d.datum_id,
                    "payload": d.payload,
                    "submitted_at": d.submitted_at,
                    "leaf_hash": d.leaf_hash,
                    "batch_id": d.batch_id,
                })
            })
            .collect(),
    ))
}
