//! Live status endpoint

use axum::{Json, extract::State};

use crate::api::{error::ApiResult, state::ApiState, types::StatusResponse};

/// GET /api/v1/status
///
/// Probes every registered server before answering, so the response time is
/// bounded by the probe timeout.
pub async fn live_status(State(state): State<ApiState>) -> ApiResult<Json<StatusResponse>> {
    let servers = state.query.live_status().await?;

    Ok(Json(StatusResponse {
        count: servers.len(),
        servers,
    }))
}
