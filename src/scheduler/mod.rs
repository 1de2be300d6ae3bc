//! Scan Scheduler - periodic fan-out of status probes
//!
//! One cycle reads a registry snapshot, probes every server with bounded
//! concurrency and stores an [`Observation`] for every server that answered.
//!
//! ## Message Flow
//!
//! ```text
//! Timer / ScanNow → list_servers → probe (≤ N at once) → insert Observation
//!                                     │
//!                                     └── Offline → logged, nothing stored
//! ```
//!
//! A server that hangs or fails never delays or aborts the others: each probe
//! runs in its own task under its own timeout, and storage errors are counted
//! per server instead of failing the cycle.

pub mod clock;
pub mod messages;
pub mod policy;

pub use clock::{Clock, ManualClock, SystemClock};
pub use messages::{CycleReport, ScanCommand};
pub use policy::CyclePolicy;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::MonitoredServer;
use crate::probe::{ProbeResult, StatusProber};
use crate::registry::RegistryReader;
use crate::storage::{MetricsStore, Observation};

/// Scan tuning knobs
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Period between cycle starts
    pub interval: Duration,
    /// Per-probe timeout
    pub probe_timeout: Duration,
    /// Upper bound on probes in flight at once
    pub max_concurrent_probes: usize,
    pub policy: CyclePolicy,
    /// Time an in-flight cycle gets to finish after shutdown is requested
    pub shutdown_grace: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
            max_concurrent_probes: 64,
            policy: CyclePolicy::FixedRate,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

enum ProbeOutcome {
    Offline,
    Stored,
    StoreFailed,
}

/// Periodic scanner over the registry
pub struct ScanScheduler {
    registry: Arc<dyn RegistryReader>,
    prober: Arc<dyn StatusProber>,
    store: Arc<dyn MetricsStore>,
    clock: Arc<dyn Clock>,
    config: ScanConfig,
}

impl ScanScheduler {
    pub fn new(
        registry: Arc<dyn RegistryReader>,
        prober: Arc<dyn StatusProber>,
        store: Arc<dyn MetricsStore>,
        clock: Arc<dyn Clock>,
        config: ScanConfig,
    ) -> Self {
        Self {
            registry,
            prober,
            store,
            clock,
            config,
        }
    }

    /// Run one full cycle over the current registry snapshot
    ///
    /// Never fails: a registry error yields an empty report with
    /// `registry_error` set, and the next cycle simply tries again.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();

        let servers = match self.registry.list_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                warn!("failed to read registry, skipping cycle: {}", e);
                return CycleReport {
                    elapsed: started.elapsed(),
                    ..CycleReport::registry_failed(e.to_string())
                };
            }
        };

        let mut report = CycleReport {
            servers: servers.len(),
            ..CycleReport::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_probes.max(1)));
        let mut tasks = JoinSet::new();

        for server in servers {
            tasks.spawn(probe_and_store(
                server,
                semaphore.clone(),
                self.prober.clone(),
                self.store.clone(),
                self.clock.clone(),
                self.config.probe_timeout,
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ProbeOutcome::Offline) => report.offline += 1,
                Ok(ProbeOutcome::Stored) => {
                    report.online += 1;
                    report.stored += 1;
                }
                Ok(ProbeOutcome::StoreFailed) => {
                    report.online += 1;
                    report.store_failures += 1;
                }
                Err(e) => {
                    error!("probe task failed: {}", e);
                    report.offline += 1;
                }
            }
        }

        report.elapsed = started.elapsed();
        report
    }

    /// Run a cycle, giving it `shutdown_grace` to finish if `token` fires
    ///
    /// Returns `None` when the grace period ran out; remaining probe tasks
    /// are aborted when the cycle future is dropped.
    async fn run_cycle_guarded(&self, token: &CancellationToken) -> Option<CycleReport> {
        let cycle = self.run_cycle();
        tokio::pin!(cycle);

        tokio::select! {
            report = &mut cycle => Some(report),
            _ = token.cancelled() => {
                info!(
                    "shutdown requested, waiting up to {:?} for the current cycle",
                    self.config.shutdown_grace
                );
                match time::timeout(self.config.shutdown_grace, &mut cycle).await {
                    Ok(report) => Some(report),
                    Err(_) => {
                        warn!("scan cycle did not finish within the grace period, aborting");
                        None
                    }
                }
            }
        }
    }

    /// Run the actor's main loop until `token` is cancelled
    ///
    /// The first cycle starts immediately.
    #[instrument(skip_all)]
    pub async fn run(self, mut command_rx: mpsc::Receiver<ScanCommand>, token: CancellationToken) {
        info!(
            "starting scan scheduler (interval {:?}, timeout {:?}, concurrency {})",
            self.config.interval, self.config.probe_timeout, self.config.max_concurrent_probes
        );

        let mut next_start = Instant::now();

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break,

                Some(cmd) = command_rx.recv() => match cmd {
                    ScanCommand::ScanNow { respond_to } => {
                        debug!("received ScanNow command");
                        let started = Instant::now();
                        let Some(report) = self.run_cycle_guarded(&token).await else {
                            break;
                        };
                        log_report(&report);
                        // A manual cycle replaces the next scheduled one
                        next_start = self.config.policy.next_start(
                            started,
                            Instant::now(),
                            self.config.interval,
                        );
                        let _ = respond_to.send(report);
                    }
                },

                _ = time::sleep_until(next_start) => {
                    let started = Instant::now();
                    let Some(report) = self.run_cycle_guarded(&token).await else {
                        break;
                    };
                    log_report(&report);
                    next_start = self.config.policy.next_start(
                        started,
                        Instant::now(),
                        self.config.interval,
                    );
                }
            }
        }

        info!("scan scheduler stopped");
    }
}

async fn probe_and_store(
    server: MonitoredServer,
    semaphore: Arc<Semaphore>,
    prober: Arc<dyn StatusProber>,
    store: Arc<dyn MetricsStore>,
    clock: Arc<dyn Clock>,
    probe_timeout: Duration,
) -> ProbeOutcome {
    // The semaphore is never closed
    let _permit = semaphore.acquire_owned().await.ok();

    // Bounded here as well, so a prober that ignores its timeout cannot stall the cycle
    let result = match time::timeout(probe_timeout, prober.probe_server(&server, probe_timeout)).await
    {
        Ok(result) => result,
        Err(_) => ProbeResult::offline(format!("timed out after {probe_timeout:?}")),
    };

    let Some(observation) = Observation::from_probe(server.id, &result, clock.now()) else {
        if let ProbeResult::Offline { reason } = &result {
            debug!("server {} ({}) offline: {}", server.id, server.endpoint(), reason);
        }
        return ProbeOutcome::Offline;
    };

    match store.insert(observation).await {
        Ok(()) => ProbeOutcome::Stored,
        Err(e) => {
            error!("failed to store observation for server {}: {}", server.id, e);
            ProbeOutcome::StoreFailed
        }
    }
}

fn log_report(report: &CycleReport) {
    if report.registry_error.is_some() {
        return;
    }
    info!(
        "scan cycle complete: {}/{} online, {} stored in {:?}",
        report.online, report.servers, report.stored, report.elapsed
    );
    if report.store_failures > 0 {
        warn!("{} observations could not be stored", report.store_failures);
    }
}

/// Handle for controlling a running [`ScanScheduler`]
pub struct ScanHandle {
    sender: mpsc::Sender<ScanCommand>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ScanHandle {
    /// Spawn the scheduler as a tokio task
    ///
    /// The scheduler stops when `token` (or [`ScanHandle::shutdown`]) cancels it.
    pub fn spawn(scheduler: ScanScheduler, token: CancellationToken) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let token = token.child_token();

        let task = tokio::spawn(scheduler.run(cmd_rx, token.clone()));

        Self {
            sender: cmd_tx,
            token,
            task,
        }
    }

    /// Run a cycle immediately and wait for its report
    pub async fn scan_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ScanCommand::ScanNow { respond_to: tx })
            .await
            .context("failed to send ScanNow command")?;

        rx.await.context("scheduler stopped before completing the cycle")
    }

    /// Stop the scheduler and wait for it to exit
    pub async fn shutdown(self) -> Result<()> {
        self.token.cancel();
        self.task.await.context("scan scheduler task failed")
    }
}
