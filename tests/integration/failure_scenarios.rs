//! Failure isolation tests
//!
//! A hanging, failing or panicking server must never hold back the others,
//! and infrastructure errors must never stop the scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use craftwatch::{
    MonitoredServer, ServerProtocol,
    registry::{RegistryError, RegistryReader, RegistryResult},
    scheduler::{ManualClock, ScanConfig, ScanHandle, ScanScheduler},
    storage::{MemoryBackend, MetricsStore},
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::helpers::{Behavior, ScriptedProber, fixed_time, memory_registry};

fn scheduler(
    registry: Arc<dyn RegistryReader>,
    prober: Arc<ScriptedProber>,
    store: Arc<MemoryBackend>,
    probe_timeout: Duration,
) -> ScanScheduler {
    ScanScheduler::new(
        registry,
        prober,
        store,
        Arc::new(ManualClock::new(fixed_time())),
        ScanConfig {
            probe_timeout,
            ..ScanConfig::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_hanging_server_does_not_delay_others() {
    let registry = memory_registry(&[
        (ServerProtocol::Java, "hang", 25565),
        (ServerProtocol::Java, "ok", 25565),
    ])
    .await;
    let prober = Arc::new(ScriptedProber::new(&[
        ("hang", Behavior::Hang),
        ("ok", Behavior::Online { players: 3, latency: 20 }),
    ]));
    let store = Arc::new(MemoryBackend::new());

    let started = Instant::now();
    let report = scheduler(registry, prober, store.clone(), Duration::from_secs(5))
        .run_cycle()
        .await;

    assert!(started.elapsed() <= Duration::from_secs(5));
    assert_eq!((report.online, report.offline), (1, 1));
    assert_eq!(store.query(2, fixed_time()).await.unwrap().len(), 1);
    assert!(store.query(1, fixed_time()).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_healthy_server_recorded_while_other_still_hangs() {
    let registry = memory_registry(&[
        (ServerProtocol::Java, "hang", 25565),
        (ServerProtocol::Java, "ok", 25565),
    ])
    .await;
    let prober = Arc::new(ScriptedProber::new(&[
        ("hang", Behavior::Hang),
        ("ok", Behavior::Online { players: 3, latency: 20 }),
    ]));
    let store = Arc::new(MemoryBackend::new());
    let scheduler = scheduler(registry, prober, store.clone(), Duration::from_secs(5));

    let cycle = tokio::spawn(async move { scheduler.run_cycle().await });

    // Well inside the 5s timeout of the hanging probe
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!cycle.is_finished());
    assert_eq!(store.query(2, fixed_time()).await.unwrap().len(), 1);
    assert!(store.query(1, fixed_time()).await.unwrap().is_empty());

    let report = cycle.await.unwrap();
    assert_eq!((report.online, report.offline), (1, 1));
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_panicking_probe_is_isolated() {
    let registry = memory_registry(&[
        (ServerProtocol::Bedrock, "boom", 19132),
        (ServerProtocol::Java, "ok", 25565),
    ])
    .await;
    let prober = Arc::new(ScriptedProber::new(&[
        ("boom", Behavior::Panic),
        ("ok", Behavior::Online { players: 1, latency: 5 }),
    ]));
    let store = Arc::new(MemoryBackend::new());

    let report = scheduler(registry, prober, store.clone(), Duration::from_secs(1))
        .run_cycle()
        .await;

    assert_eq!(report.servers, 2);
    assert_eq!(report.offline, 1);
    assert_eq!(report.stored, 1);
}

#[tokio::test]
async fn test_offline_servers_store_nothing() {
    let registry = memory_registry(&[
        (ServerProtocol::Java, "a", 25565),
        (ServerProtocol::Java, "b", 25565),
    ])
    .await;
    let prober = Arc::new(ScriptedProber::new(&[
        ("a", Behavior::Offline("connection refused")),
        ("b", Behavior::Offline("protocol error")),
    ]));
    let store = Arc::new(MemoryBackend::new());

    let report = scheduler(registry, prober, store.clone(), Duration::from_secs(1))
        .run_cycle()
        .await;

    assert_eq!(report.offline, 2);
    assert_eq!(store.count().await.unwrap(), 0);
}

/// Registry that fails its first `failures` reads
struct FlakyRegistry {
    failures: usize,
    reads: AtomicUsize,
    servers: Vec<MonitoredServer>,
}

#[async_trait]
impl RegistryReader for FlakyRegistry {
    async fn list_servers(&self) -> RegistryResult<Vec<MonitoredServer>> {
        if self.reads.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(RegistryError::Unavailable("connection reset".to_string()));
        }
        Ok(self.servers.clone())
    }
}

#[tokio::test(start_paused = true)]
async fn test_registry_failure_is_retried_next_cycle() {
    let registry = Arc::new(FlakyRegistry {
        failures: 1,
        reads: AtomicUsize::new(0),
        servers: vec![MonitoredServer {
            id: 1,
            protocol: ServerProtocol::Java,
            address: "ok".to_string(),
            port: 25565,
        }],
    });
    let prober = Arc::new(ScriptedProber::new(&[(
        "ok",
        Behavior::Online { players: 8, latency: 10 },
    )]));
    let store = Arc::new(MemoryBackend::new());

    let handle = ScanHandle::spawn(
        scheduler(registry.clone(), prober, store.clone(), Duration::from_secs(1)),
        CancellationToken::new(),
    );

    // First cycle at t=0 fails to read the registry, second at t=60 succeeds
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(store.count().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_secs(40)).await;
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(registry.reads.load(Ordering::SeqCst), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_store_outage_does_not_stop_scheduler() {
    let registry = memory_registry(&[(ServerProtocol::Java, "ok", 25565)]).await;
    let prober = Arc::new(ScriptedProber::new(&[(
        "ok",
        Behavior::Online { players: 2, latency: 3 },
    )]));
    let store = Arc::new(MemoryBackend::new());
    store.close().await.unwrap();

    let handle = ScanHandle::spawn(
        scheduler(registry, prober.clone(), store, Duration::from_secs(1)),
        CancellationToken::new(),
    );

    let first = handle.scan_now().await.unwrap();
    assert_eq!(first.store_failures, 1);

    let second = handle.scan_now().await.unwrap();
    assert_eq!(second.store_failures, 1);
    assert!(prober.calls() >= 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_parent_token_stops_scheduler() {
    let registry = memory_registry(&[]).await;
    let token = CancellationToken::new();

    let handle = ScanHandle::spawn(
        scheduler(
            registry,
            Arc::new(ScriptedProber::default()),
            Arc::new(MemoryBackend::new()),
            Duration::from_secs(1),
        ),
        token.clone(),
    );

    token.cancel();
    assert!(handle.scan_now().await.is_err());
    handle.shutdown().await.unwrap();
}
