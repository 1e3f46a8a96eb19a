//! Health and system metric endpoints

use axum::{extract::State, Json};
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;

/// Liveness probe
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": state.version,
    }))
}

/// Readiness probe: the store must answer
pub async fn ready_check(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.store.stats().await.map_err(zkiot_service::ServiceError::from)?;
    Ok(Json(json!({ "status": "ready" })))
}

/// Aggregate counters over the persisted collections
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let stats = state
        .store
        .stats()
        .await
        .map_err(zkiot_service::ServiceError::from)?;
    let connections = state.bus.connection_count().await;
    Ok(Json(json!({
        "devices": {
            "total": stats.total_devices,
            "active": stats.active_devices,
        },
        "data": {
            "total": stats.total_data,
            "pending": stats.pending_data,
            "anchored": stats.anchored_data,
        },
        "batches": stats.total_batches,
        "authentications": stats.total_auths,
        "subscribers": connections,
    })))
}
