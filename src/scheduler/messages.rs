//! Message types for the scan actor

use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

/// Commands that can be sent to a running [`ScanScheduler`](super::ScanScheduler)
#[derive(Debug)]
pub enum ScanCommand {
    /// Run a cycle now, outside the regular schedule
    ScanNow {
        respond_to: oneshot::Sender<CycleReport>,
    },
}

/// Summary of one scan cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Servers in the registry snapshot
    pub servers: usize,
    pub online: usize,
    pub offline: usize,
    /// Observations successfully inserted
    pub stored: usize,
    pub store_failures: usize,
    /// Set when the registry could not be read; no probes ran
    pub registry_error: Option<String>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn registry_failed(reason: impl Into<String>) -> Self {
        Self {
            registry_error: Some(reason.into()),
            ..Self::default()
        }
    }
}
