//! Presence and event endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use zkiot_core::types::{Event, PresenceRecord};

use crate::dto::EventsQuery;
use crate::error::ApiResult;
use crate::state::AppState;

/// Device liveness ping
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.presence.heartbeat(&device_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Presence of every tracked device, classified at query time
pub async fn device_statuses(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PresenceRecord>>> {
    Ok(Json(state.presence.list_statuses().await?))
}

/// Recent events from the bounded history ring
pub async fn recent_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<Event>> {
    let limit = query.limit.unwrap_or(50);
    Json(state.bus.recent(limit).await)
}
