//! Periodic retention cleanup
//!
//! Deletes observations older than `retention_days`. Runs once at startup,
//! then every `cleanup_interval`, until the cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace};

use super::backend::MetricsStore;
use super::error::StorageResult;
use crate::scheduler::Clock;

pub struct RetentionTask {
    store: Arc<dyn MetricsStore>,
    clock: Arc<dyn Clock>,
    retention_days: u32,
    cleanup_interval: Duration,
}

impl RetentionTask {
    pub fn new(
        store: Arc<dyn MetricsStore>,
        clock: Arc<dyn Clock>,
        retention_days: u32,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            retention_days,
            cleanup_interval,
        }
    }

    /// Delete everything older than the retention window, returning the count
    pub async fn run_cleanup(&self) -> StorageResult<usize> {
        let cutoff = self.clock.now() - chrono::Duration::days(i64::from(self.retention_days));
        debug!("running retention cleanup (deleting data before {})", cutoff);

        let deleted = self.store.cleanup_old_observations(cutoff).await?;
        if deleted > 0 {
            info!("retention cleanup complete: deleted {} old observations", deleted);
        } else {
            trace!("retention cleanup: nothing to delete");
        }
        Ok(deleted)
    }

    #[instrument(skip_all, fields(retention_days = self.retention_days))]
    async fn run(self, token: CancellationToken) {
        let mut ticker = time::interval(self.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cleanup().await {
                        // Retried on the next tick
                        error!("failed to clean up old observations: {}", e);
                    }
                }
            }
        }

        debug!("retention task stopped");
    }

    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }
}
