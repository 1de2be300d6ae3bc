//! Query Service - live snapshot and historical windows
//!
//! `live_status` probes every registered server on demand through the same
//! [`StatusProber`] the scheduler uses. `historical_stats` reads back stored
//! observations for one server over a [`TimeWindow`].

pub mod window;

pub use window::TimeWindow;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::probe::{ProbeResult, StatusProber};
use crate::registry::{RegistryError, RegistryReader};
use crate::scheduler::Clock;
use crate::storage::{MetricsStore, Observation, StorageError};
use crate::{MonitoredServer, ServerId, ServerProtocol};

#[derive(Error, Debug)]
pub enum QueryError {
    /// Bad request input; never retried
    #[error("{0}")]
    InvalidArgument(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),

    #[error("registry unavailable: {0}")]
    RegistryUnavailable(#[from] RegistryError),
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub probe_timeout: Duration,
    pub max_concurrent_probes: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            max_concurrent_probes: 64,
        }
    }
}

/// Current state of one server, probed on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveStatus {
    pub id: ServerId,
    pub protocol: ServerProtocol,
    pub address: String,
    pub port: u16,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_millis: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LiveStatus {
    fn new(server: MonitoredServer, result: ProbeResult) -> Self {
        let mut status = Self {
            id: server.id,
            protocol: server.protocol,
            address: server.address,
            port: server.port,
            online: false,
            player_count: None,
            latency_millis: None,
            description: None,
            error: None,
        };

        match result {
            ProbeResult::Online {
                player_count,
                latency_millis,
                description,
            } => {
                status.online = true;
                status.player_count = Some(player_count);
                status.latency_millis = Some(latency_millis);
                status.description = Some(description);
            }
            ProbeResult::Offline { reason } => status.error = Some(reason),
        }

        status
    }
}

/// One point of a historical series
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatPoint {
    pub player_count: u32,
    pub latency_millis: u32,
    pub observed_at: DateTime<Utc>,
}

impl From<Observation> for StatPoint {
    fn from(observation: Observation) -> Self {
        Self {
            player_count: observation.player_count,
            latency_millis: observation.latency_millis,
            observed_at: observation.observed_at,
        }
    }
}

/// Observations of one server over one window, oldest first
#[derive(Debug, Clone, Serialize)]
pub struct HistoricalStats {
    pub server_id: ServerId,
    pub window: TimeWindow,
    pub since: DateTime<Utc>,
    pub stats: Vec<StatPoint>,
}

pub struct QueryService {
    registry: Arc<dyn RegistryReader>,
    prober: Arc<dyn StatusProber>,
    store: Arc<dyn MetricsStore>,
    clock: Arc<dyn Clock>,
    config: QueryConfig,
}

impl QueryService {
    pub fn new(
        registry: Arc<dyn RegistryReader>,
        prober: Arc<dyn StatusProber>,
        store: Arc<dyn MetricsStore>,
        clock: Arc<dyn Clock>,
        config: QueryConfig,
    ) -> Self {
        Self {
            registry,
            prober,
            store,
            clock,
            config,
        }
    }

    /// Probe every registered server now, in registry order
    ///
    /// A failing server shows up as `online: false` with an error message;
    /// it never fails the whole call.
    #[instrument(skip(self))]
    pub async fn live_status(&self) -> Result<Vec<LiveStatus>, QueryError> {
        let servers = self.registry.list_servers().await.map_err(|e| {
            warn!("failed to read registry: {}", e);
            QueryError::from(e)
        })?;

        let timeout = self.config.probe_timeout;
        let statuses = stream::iter(servers)
            .map(|server| {
                let prober = self.prober.clone();
                async move {
                    let result =
                        match tokio::time::timeout(timeout, prober.probe_server(&server, timeout))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => ProbeResult::offline(format!("timed out after {timeout:?}")),
                        };
                    LiveStatus::new(server, result)
                }
            })
            .buffered(self.config.max_concurrent_probes.max(1))
            .collect::<Vec<_>>()
            .await;

        debug!(
            "live status: {}/{} online",
            statuses.iter().filter(|s| s.online).count(),
            statuses.len()
        );

        Ok(statuses)
    }

    /// Historical stats from raw request input
    ///
    /// Fails with [`QueryError::InvalidArgument`] when `server_id` is missing
    /// or not an integer, or when `window` is not a known label.
    pub async fn historical_stats(
        &self,
        server_id: Option<&str>,
        window: &str,
    ) -> Result<HistoricalStats, QueryError> {
        let server_id = parse_server_id(server_id)?;
        let window = window
            .parse::<TimeWindow>()
            .map_err(QueryError::InvalidArgument)?;

        self.historical_stats_for(server_id, window).await
    }

    /// Observations for `server_id` within `window` of now
    ///
    /// An unknown server yields an empty series.
    #[instrument(skip(self))]
    pub async fn historical_stats_for(
        &self,
        server_id: ServerId,
        window: TimeWindow,
    ) -> Result<HistoricalStats, QueryError> {
        let since = window.since(self.clock.now());

        let observations = self.store.query(server_id, since).await?;

        Ok(HistoricalStats {
            server_id,
            window,
            since,
            stats: observations.into_iter().map(StatPoint::from).collect(),
        })
    }
}

fn parse_server_id(raw: Option<&str>) -> Result<ServerId, QueryError> {
    let raw = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| QueryError::InvalidArgument("server_id is required".to_string()))?;

    raw.parse::<ServerId>().map_err(|_| {
        QueryError::InvalidArgument(format!("server_id must be an integer, got '{raw}'"))
    })
}
