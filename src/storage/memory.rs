//! In-memory storage backend (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Running without a database (`"backend": "none"`)
//!
//! All data is lost on restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, MetricsStore};
use super::error::{StorageError, StorageResult};
use super::schema::Observation;
use crate::ServerId;

/// In-memory storage backend
///
/// Observations are grouped by server in insertion order. Once closed,
/// every operation fails with [`StorageError::Unavailable`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    observations: RwLock<HashMap<ServerId, Vec<Observation>>>,
    closed: AtomicBool,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Unavailable(
                "in-memory backend is closed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsStore for MemoryBackend {
    async fn insert(&self, observation: Observation) -> StorageResult<()> {
        self.ensure_open()?;
        let mut observations = self.observations.write().await;
        observations
            .entry(observation.server_id)
            .or_default()
            .push(observation);
        Ok(())
    }

    async fn insert_batch(&self, batch: Vec<Observation>) -> StorageResult<()> {
        self.ensure_open()?;
        let mut observations = self.observations.write().await;
        for observation in batch {
            observations
                .entry(observation.server_id)
                .or_default()
                .push(observation);
        }
        Ok(())
    }

    async fn query(
        &self,
        server_id: ServerId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Observation>> {
        self.ensure_open()?;
        debug!("querying in-memory storage for server {server_id}");

        let observations = self.observations.read().await;
        let mut matching: Vec<Observation> = observations
            .get(&server_id)
            .map(|rows| {
                rows.iter()
                    .filter(|o| o.observed_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Stable, so equal timestamps keep insertion order
        matching.sort_by_key(|o| o.observed_at);
        Ok(matching)
    }

    async fn count(&self) -> StorageResult<usize> {
        self.ensure_open()?;
        let observations = self.observations.read().await;
        Ok(observations.values().map(Vec::len).sum())
    }

    async fn cleanup_old_observations(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        self.ensure_open()?;
        let mut observations = self.observations.write().await;

        let mut deleted = 0;
        for rows in observations.values_mut() {
            let len = rows.len();
            rows.retain(|o| o.observed_at >= before);
            deleted += len - rows.len();
        }
        observations.retain(|_, rows| !rows.is_empty());

        debug!("deleted {deleted} observations before {before}");
        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let closed = self.closed.load(Ordering::Acquire);
        let total = self.observations.read().await.values().map(Vec::len).sum::<usize>();

        Ok(HealthStatus {
            healthy: !closed,
            message: if closed {
                "In-memory storage closed".to_string()
            } else {
                "In-memory storage operational".to_string()
            },
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("total_observations".to_string(), total.to_string()),
            ]),
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        let observations = self.observations.read().await;
        Ok(format!(
            "In-Memory: {} observations across {} servers",
            observations.values().map(Vec::len).sum::<usize>(),
            observations.len()
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend");
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
