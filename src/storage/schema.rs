//! Row types persisted by the storage backends

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::ServerId;
use crate::probe::ProbeResult;

/// One successful probe of one server at one point in time
///
/// Observations are append-only. Two identical observations are two
/// distinct probe events and are both kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub server_id: ServerId,
    pub player_count: u32,
    pub latency_millis: u32,
    /// When the probe completed (always UTC, microsecond precision)
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    /// `observed_at` is truncated to whole microseconds, the precision every
    /// backend stores
    pub fn new(
        server_id: ServerId,
        player_count: u32,
        latency_millis: u32,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            server_id,
            player_count,
            latency_millis,
            observed_at: observed_at.trunc_subsecs(6),
        }
    }

    /// Build an observation from a probe result; `None` for offline results
    pub fn from_probe(
        server_id: ServerId,
        result: &ProbeResult,
        observed_at: DateTime<Utc>,
    ) -> Option<Self> {
        match result {
            ProbeResult::Online {
                player_count,
                latency_millis,
                ..
            } => Some(Self::new(
                server_id,
                *player_count,
                *latency_millis,
                observed_at,
            )),
            ProbeResult::Offline { .. } => None,
        }
    }
}
