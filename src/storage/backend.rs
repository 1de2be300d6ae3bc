//! Metrics store trait definition
//!
//! This module defines the `MetricsStore` trait that all
//! storage implementations must implement.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::StorageResult;
use super::schema::Observation;
use crate::ServerId;

/// Health status of the storage backend
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Durable append/query interface for observations
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared between
/// concurrent probe tasks and the query service.
///
/// ## Ordering
///
/// No ordering is promised at insert time. `query` always returns
/// observations ascending by `observed_at`, whatever order they arrived in.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Append one observation
    ///
    /// Duplicates and out-of-order timestamps are accepted and stored.
    async fn insert(&self, observation: Observation) -> StorageResult<()>;

    /// Append several observations
    async fn insert_batch(&self, observations: Vec<Observation>) -> StorageResult<()> {
        for observation in observations {
            self.insert(observation).await?;
        }
        Ok(())
    }

    /// All observations for `server_id` with `observed_at >= since`, oldest first
    ///
    /// Unknown servers yield an empty vector.
    async fn query(
        &self,
        server_id: ServerId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Observation>>;

    /// Total number of stored observations
    async fn count(&self) -> StorageResult<usize>;

    /// Delete observations older than `before`
    ///
    /// Used for retention policy enforcement. Returns the number deleted.
    async fn cleanup_old_observations(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Lightweight check that the backend is operational
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Human-readable statistics (e.g. "SQLite: 1200 rows, 0.45 MB on disk")
    async fn get_stats(&self) -> StorageResult<String>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
