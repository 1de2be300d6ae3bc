//! Status probing for monitored game servers
//!
//! A probe sends one status query to one server and always resolves to a
//! [`ProbeResult`] value. Failures never escape as errors: network errors,
//! protocol violations and timeouts all become [`ProbeResult::Offline`].
//!
//! ## Layers
//!
//! - [`StatusProtocol`]: one implementation per wire protocol family
//!   ([`JavaStatus`], [`BedrockStatus`]). Returns `Result<ServerStatus, ProbeError>`.
//! - [`StatusProber`]: what the scheduler and query service depend on.
//!   [`NetworkProber`] dispatches to the matching protocol and enforces the timeout.
//!
//! Adding a protocol family means adding a [`ServerProtocol`] variant and a
//! [`StatusProtocol`] implementation; callers of [`StatusProber`] are unaffected.

mod bedrock;
mod java;

pub use bedrock::BedrockStatus;
pub use java::JavaStatus;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{MonitoredServer, ServerProtocol};

/// Reasons a single status query can fail
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        ProbeError::Network(err.to_string())
    }
}

/// Normalized status returned by every protocol family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    pub player_count: u32,
    pub latency_millis: u32,
    pub description: String,
}

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeResult {
    Online {
        player_count: u32,
        latency_millis: u32,
        description: String,
    },
    Offline {
        reason: String,
    },
}

impl ProbeResult {
    pub fn offline(reason: impl Into<String>) -> Self {
        ProbeResult::Offline {
            reason: reason.into(),
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, ProbeResult::Online { .. })
    }
}

impl From<ServerStatus> for ProbeResult {
    fn from(status: ServerStatus) -> Self {
        ProbeResult::Online {
            player_count: status.player_count,
            latency_millis: status.latency_millis,
            description: status.description,
        }
    }
}

impl From<Result<ServerStatus, ProbeError>> for ProbeResult {
    fn from(result: Result<ServerStatus, ProbeError>) -> Self {
        match result {
            Ok(status) => status.into(),
            Err(e) => ProbeResult::offline(e.to_string()),
        }
    }
}

/// A status query capability for one protocol family
#[async_trait]
pub trait StatusProtocol: Send + Sync {
    /// Query the server once. Implementations do not retry and do not
    /// enforce a timeout themselves; [`NetworkProber`] does.
    async fn query(&self, address: &str, port: u16) -> Result<ServerStatus, ProbeError>;
}

/// Anything that can probe a server and return a [`ProbeResult`]
///
/// Implementations must never panic on network input and must resolve
/// within roughly `timeout`.
#[async_trait]
pub trait StatusProber: Send + Sync {
    async fn probe(
        &self,
        protocol: ServerProtocol,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> ProbeResult;

    /// Convenience wrapper taking a registry entry
    async fn probe_server(&self, server: &MonitoredServer, timeout: Duration) -> ProbeResult {
        self.probe(server.protocol, &server.address, server.port, timeout)
            .await
    }
}

/// Production prober talking to real servers
pub struct NetworkProber {
    java: JavaStatus,
    bedrock: BedrockStatus,
}

impl NetworkProber {
    pub fn new() -> Self {
        Self {
            java: JavaStatus::new(),
            bedrock: BedrockStatus::new(),
        }
    }

    fn capability(&self, protocol: ServerProtocol) -> &dyn StatusProtocol {
        match protocol {
            ServerProtocol::Java => &self.java,
            ServerProtocol::Bedrock => &self.bedrock,
        }
    }
}

impl Default for NetworkProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusProber for NetworkProber {
    #[instrument(skip(self))]
    async fn probe(
        &self,
        protocol: ServerProtocol,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> ProbeResult {
        if let Err(e) = validate_target(address, port, timeout) {
            return ProbeResult::offline(e.to_string());
        }

        let query = self.capability(protocol).query(address, port);
        let result = match tokio::time::timeout(timeout, query).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        };

        if let Err(e) = &result {
            debug!("probe of {address}:{port} failed: {e}");
        }

        result.into()
    }
}

fn validate_target(address: &str, port: u16, timeout: Duration) -> Result<(), ProbeError> {
    if address.trim().is_empty() {
        return Err(ProbeError::InvalidTarget("address is empty".to_string()));
    }
    if port == 0 {
        return Err(ProbeError::InvalidTarget(
            "port must be in 1..=65535".to_string(),
        ));
    }
    if timeout.is_zero() {
        return Err(ProbeError::InvalidTarget(
            "timeout must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Whole milliseconds, saturating at `u32::MAX`
pub(crate) fn duration_to_millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}
