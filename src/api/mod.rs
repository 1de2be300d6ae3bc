//! REST API for the hub
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **QueryService** for live status and historical windows
//! - **ServerRegistry** for adding and removing monitored servers
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check including storage health
//! - `GET /api/v1/status` - Probe every server now
//! - `GET /api/v1/stats/:window?server_id=N` - Stored observations over `hour|day|month|year`
//! - `GET /api/v1/servers` - List monitored servers
//! - `POST /api/v1/servers` - Register a server
//! - `DELETE /api/v1/servers/:id` - Remove a server and its history

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{HealthResponse, ServersResponse, StatsResponse, StatusResponse};

use std::net::{Ipv4Addr, SocketAddr};

use axum::{
    Router,
    routing::{delete, get},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:5000")
    pub bind_addr: SocketAddr,

    /// Optional bearer token required on every request
    pub auth_token: Option<String>,

    /// Enable CORS for browser dashboards
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 5000)),
            auth_token: None,
            enable_cors: true,
        }
    }
}

impl From<&crate::config::ApiSection> for ApiConfig {
    fn from(section: &crate::config::ApiSection) -> Self {
        Self {
            bind_addr: section.bind_addr(),
            auth_token: section.auth_token.clone(),
            enable_cors: section.enable_cors,
        }
    }
}

pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/status", get(routes::status::live_status))
        .route("/api/v1/stats/:window", get(routes::stats::historical_stats))
        .route(
            "/api/v1/servers",
            get(routes::servers::list_servers).post(routes::servers::add_server),
        )
        .route("/api/v1/servers/:id", delete(routes::servers::remove_server))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    // Outermost, so preflight requests are answered before auth runs
    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// Starts the server in a background task that stops when `shutdown` is
/// cancelled. Returns the server's local address.
pub async fn spawn_api_server(
    config: ApiConfig,
    state: ApiState,
    shutdown: CancellationToken,
) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
