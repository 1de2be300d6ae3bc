//! Cycle timing policy

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// How the start of the next scan cycle is derived from the last one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Cycles start `period` apart. A cycle that overruns its period is
    /// followed immediately by the next one, never by a further full wait.
    #[default]
    FixedRate,
    /// The next cycle starts `period` after the previous one finished
    FixedDelay,
}

impl CyclePolicy {
    pub fn next_start(self, started: Instant, finished: Instant, period: Duration) -> Instant {
        match self {
            CyclePolicy::FixedRate => (started + period).max(finished),
            CyclePolicy::FixedDelay => finished + period,
        }
    }
}
