//! Registry endpoints

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde_json::{Value, json};
use tracing::info;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::ServersResponse,
};
use crate::registry::NewServer;
use crate::{MonitoredServer, ServerId};

/// GET /api/v1/servers
pub async fn list_servers(State(state): State<ApiState>) -> ApiResult<Json<ServersResponse>> {
    let servers = state.registry.list_servers().await?;

    Ok(Json(ServersResponse {
        count: servers.len(),
        servers,
    }))
}

/// POST /api/v1/servers
pub async fn add_server(
    State(state): State<ApiState>,
    body: Result<Json<NewServer>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MonitoredServer>)> {
    let Json(server) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let server = state.registry.add_server(server).await?;
    info!("added server {} ({})", server.id, server.endpoint());

    Ok((StatusCode::CREATED, Json(server)))
}

/// DELETE /api/v1/servers/:id
pub async fn remove_server(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id: ServerId = id
        .parse()
        .map_err(|_| ApiError::InvalidRequest(format!("server id must be an integer, got '{id}'")))?;

    if !state.registry.remove_server(id).await? {
        return Err(ApiError::NotFound(format!("server {id} not found")));
    }

    info!("removed server {id}");
    Ok(Json(json!({ "removed": id })))
}
