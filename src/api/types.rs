//! API response bodies

use serde::Serialize;

use crate::MonitoredServer;
use crate::query::{HistoricalStats, LiveStatus};
use crate::storage::HealthStatus;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the store reports unhealthy
    pub status: String,
    pub timestamp: String,
    pub storage: HealthStatus,
    /// Backend summary, absent when the store cannot be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub servers: Vec<LiveStatus>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: HistoricalStats,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ServersResponse {
    pub servers: Vec<MonitoredServer>,
    pub count: usize,
}
