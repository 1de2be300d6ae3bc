//! In-memory registry (no persistence)
//!
//! Used with the in-memory storage backend and in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{NewServer, RegistryReader, RegistryResult, ServerRegistry};
use crate::{MonitoredServer, ServerId};

#[derive(Debug, Default)]
struct Inner {
    servers: BTreeMap<ServerId, MonitoredServer>,
    next_id: ServerId,
}

/// Registry kept in a map, ids assigned sequentially from 1
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    inner: RwLock<Inner>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryReader for MemoryRegistry {
    async fn list_servers(&self) -> RegistryResult<Vec<MonitoredServer>> {
        let inner = self.inner.read().await;
        Ok(inner.servers.values().cloned().collect())
    }
}

#[async_trait]
impl ServerRegistry for MemoryRegistry {
    async fn add_server(&self, server: NewServer) -> RegistryResult<MonitoredServer> {
        let (protocol, address, port) = server.resolve()?;

        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let server = MonitoredServer {
            id: inner.next_id,
            protocol,
            address,
            port,
        };
        inner.servers.insert(server.id, server.clone());

        debug!("registered server {} ({})", server.id, server.endpoint());
        Ok(server)
    }

    async fn remove_server(&self, id: ServerId) -> RegistryResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.servers.remove(&id).is_some())
    }

    async fn get_server(&self, id: ServerId) -> RegistryResult<Option<MonitoredServer>> {
        let inner = self.inner.read().await;
        Ok(inner.servers.get(&id).cloned())
    }
}
