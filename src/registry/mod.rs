//! Registry of monitored servers
//!
//! The scan pipeline only needs [`RegistryReader`]. Mutation lives in
//! [`ServerRegistry`], which the HTTP layer and the bootstrap use to add and
//! remove endpoints. A mutation takes effect for the next snapshot read.

pub mod memory;

pub use memory::MemoryRegistry;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::{MonitoredServer, ServerId, ServerProtocol};

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    /// The backing store could not be read or written
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// A server definition failed validation
    #[error("invalid server: {0}")]
    InvalidServer(String),
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        RegistryError::Unavailable(err.to_string())
    }
}

/// Read-only view of the registry
#[async_trait]
pub trait RegistryReader: Send + Sync {
    /// Snapshot of every registered server, ordered by id
    async fn list_servers(&self) -> RegistryResult<Vec<MonitoredServer>>;
}

/// Registry with add/remove operations
#[async_trait]
pub trait ServerRegistry: RegistryReader {
    async fn add_server(&self, server: NewServer) -> RegistryResult<MonitoredServer>;

    /// Returns `false` when no server had this id
    async fn remove_server(&self, id: ServerId) -> RegistryResult<bool>;

    async fn get_server(&self, id: ServerId) -> RegistryResult<Option<MonitoredServer>>;
}

/// Definition of a server to be registered
#[derive(Debug, Clone, Deserialize)]
pub struct NewServer {
    pub protocol: ServerProtocol,
    pub address: String,
    /// Falls back to the protocol's default port
    #[serde(default)]
    pub port: Option<u16>,
}

impl NewServer {
    pub fn new(protocol: ServerProtocol, address: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            address: address.into(),
            port: Some(port),
        }
    }

    /// Validate and resolve into (protocol, trimmed address, port)
    pub fn resolve(&self) -> RegistryResult<(ServerProtocol, String, u16)> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(RegistryError::InvalidServer(
                "address must not be empty".to_string(),
            ));
        }

        let port = self.port.unwrap_or_else(|| self.protocol.default_port());
        if port == 0 {
            return Err(RegistryError::InvalidServer(
                "port must be in 1..=65535".to_string(),
            ));
        }

        Ok((self.protocol, address.to_string(), port))
    }
}
