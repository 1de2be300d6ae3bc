//! Concurrency tests
//!
//! Verifies that parallel writers never lose observations and that the scan
//! respects its concurrency bound.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use craftwatch::{
    ServerProtocol,
    scheduler::{ManualClock, ScanConfig, ScanScheduler},
    storage::{MemoryBackend, MetricsStore, Observation},
};
use tokio::task::JoinSet;

use crate::helpers::{Behavior, ScriptedProber, fixed_time, memory_registry};

async fn insert_fifty_in_parallel(store: Arc<dyn MetricsStore>, server_id: i64) {
    let before = store.count().await.unwrap();
    let observed_at = fixed_time();

    let mut tasks = JoinSet::new();
    for i in 0..50u32 {
        let store = store.clone();
        tasks.spawn(async move {
            store
                .insert(Observation::new(server_id, i, 10, observed_at))
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    assert_eq!(store.count().await.unwrap(), before + 50);
    assert_eq!(store.query(server_id, observed_at).await.unwrap().len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_inserts_memory() {
    insert_fifty_in_parallel(Arc::new(MemoryBackend::new()), 1).await;
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_inserts_sqlite() {
    use craftwatch::registry::{NewServer, ServerRegistry};
    use craftwatch::storage::SqliteBackend;

    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SqliteBackend::new(dir.path().join("concurrent.db")).await.unwrap());
    let server = backend
        .add_server(NewServer::new(ServerProtocol::Java, "mc.example.net", 25565))
        .await
        .unwrap();

    insert_fifty_in_parallel(backend, server.id).await;
}

#[tokio::test(start_paused = true)]
async fn test_scan_respects_concurrency_bound() {
    let addresses: Vec<String> = (0..12).map(|i| format!("server-{i}")).collect();
    let servers: Vec<(ServerProtocol, &str, u16)> = addresses
        .iter()
        .map(|a| (ServerProtocol::Java, a.as_str(), 25565))
        .collect();
    let behaviors: Vec<(&str, Behavior)> = addresses
        .iter()
        .map(|a| (a.as_str(), Behavior::Online { players: 1, latency: 1 }))
        .collect();

    let prober = Arc::new(ScriptedProber::new(&behaviors).with_delay(Duration::from_millis(100)));
    let store = Arc::new(MemoryBackend::new());

    let scheduler = ScanScheduler::new(
        memory_registry(&servers).await,
        prober.clone(),
        store.clone(),
        Arc::new(ManualClock::new(fixed_time())),
        ScanConfig {
            max_concurrent_probes: 3,
            ..ScanConfig::default()
        },
    );

    let report = scheduler.run_cycle().await;
    assert_eq!(report.stored, 12);
    assert!(prober.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert_eq!(store.count().await.unwrap(), 12);
}

#[tokio::test(start_paused = true)]
async fn test_probes_overlap_within_a_cycle() {
    let servers = [
        (ServerProtocol::Java, "a", 25565),
        (ServerProtocol::Java, "b", 25565),
        (ServerProtocol::Bedrock, "c", 19132),
    ];
    let prober = Arc::new(
        ScriptedProber::new(&[
            ("a", Behavior::Online { players: 1, latency: 1 }),
            ("b", Behavior::Online { players: 2, latency: 1 }),
            ("c", Behavior::Online { players: 3, latency: 1 }),
        ])
        .with_delay(Duration::from_secs(2)),
    );

    let scheduler = ScanScheduler::new(
        memory_registry(&servers).await,
        prober.clone(),
        Arc::new(MemoryBackend::new()),
        Arc::new(ManualClock::new(fixed_time())),
        ScanConfig {
            probe_timeout: Duration::from_secs(5),
            ..ScanConfig::default()
        },
    );

    let started = tokio::time::Instant::now();
    scheduler.run_cycle().await;

    // Three 2s probes in parallel, not 6s in sequence
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(prober.max_in_flight.load(Ordering::SeqCst), 3);
}
