//! Historical statistics endpoint

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::api::{error::ApiResult, state::ApiState, types::StatsResponse};

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Kept as a string so a non-numeric id is reported in the JSON error body
    server_id: Option<String>,
}

/// GET /api/v1/stats/:window?server_id=N
pub async fn historical_stats(
    State(state): State<ApiState>,
    Path(window): Path<String>,
    Query(params): Query<StatsQuery>,
) -> ApiResult<Json<StatsResponse>> {
    let stats = state
        .query
        .historical_stats(params.server_id.as_deref(), &window)
        .await?;

    Ok(Json(StatsResponse {
        count: stats.stats.len(),
        stats,
    }))
}
