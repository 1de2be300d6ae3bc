use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use craftwatch::{
    config::{Config, StorageConfig, read_config_file},
    probe::NetworkProber,
    query::QueryService,
    registry::{MemoryRegistry, RegistryReader, ServerRegistry},
    scheduler::{Clock, ScanHandle, ScanScheduler, SystemClock},
    storage::{MemoryBackend, MetricsStore, RetentionTask},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(about = "Minecraft server status monitor")]
struct Args {
    /// Config file (JSON)
    #[arg(short, long)]
    file: String,
}

fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("craftwatch=info,craftwatch_hub=info"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

struct Backends {
    store: Arc<dyn MetricsStore>,
    registry: Arc<dyn ServerRegistry>,
    reader: Arc<dyn RegistryReader>,
}

async fn open_backends(storage: &StorageConfig) -> anyhow::Result<Backends> {
    match storage {
        StorageConfig::None => {
            warn!("storage backend 'none': observations are kept in memory only");
            let registry = Arc::new(MemoryRegistry::new());
            Ok(Backends {
                store: Arc::new(MemoryBackend::new()),
                registry: registry.clone(),
                reader: registry,
            })
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path, .. } => {
            let backend = Arc::new(craftwatch::storage::SqliteBackend::new(path).await?);
            Ok(Backends {
                store: backend.clone(),
                registry: backend.clone(),
                reader: backend,
            })
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("this build has no SQLite support, use \"backend\": \"none\"")
        }
    }
}

async fn seed_registry(registry: &dyn ServerRegistry, config: &Config) -> anyhow::Result<()> {
    if config.servers.is_empty() || !registry.list_servers().await?.is_empty() {
        return Ok(());
    }

    for server in &config.servers {
        let server = registry.add_server(server.clone()).await?;
        info!("seeded server {} ({} {})", server.id, server.protocol, server.endpoint());
    }
    Ok(())
}

async fn log_store_stats(store: &dyn MetricsStore) {
    match store.get_stats().await {
        Ok(stats) => info!("{stats}"),
        Err(e) => warn!("failed to read storage stats: {e}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let mut config = read_config_file(&args.file)?;
    config.apply_env_overrides();

    let Backends {
        store,
        registry,
        reader,
    } = open_backends(&config.storage).await?;
    seed_registry(registry.as_ref(), &config).await?;
    log_store_stats(store.as_ref()).await;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let prober = Arc::new(NetworkProber::new());
    let shutdown = CancellationToken::new();

    let scheduler = ScanScheduler::new(
        reader.clone(),
        prober.clone(),
        store.clone(),
        clock.clone(),
        config.scan.scan_config(),
    );
    let scan = ScanHandle::spawn(scheduler, shutdown.clone());

    let retention = match &config.storage {
        StorageConfig::Sqlite {
            retention_days: Some(days),
            cleanup_interval_hours,
            ..
        } => Some(
            RetentionTask::new(
                store.clone(),
                clock.clone(),
                *days,
                Duration::from_secs((*cleanup_interval_hours).max(1) * 3600),
            )
            .spawn(shutdown.clone()),
        ),
        _ => None,
    };

    let query = Arc::new(QueryService::new(
        reader,
        prober,
        store.clone(),
        clock,
        config.scan.query_config(),
    ));

    #[cfg(feature = "api")]
    if config.api.enabled {
        use craftwatch::api::{ApiConfig, ApiState, spawn_api_server};

        let state = ApiState::new(query, registry.clone(), store.clone());
        spawn_api_server(ApiConfig::from(&config.api), state, shutdown.clone()).await?;
    }
    #[cfg(not(feature = "api"))]
    drop(query);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
    }
    info!("shutting down");
    shutdown.cancel();

    if let Err(e) = scan.shutdown().await {
        error!("{e:#}");
    }
    if let Some(retention) = retention {
        if let Err(e) = retention.await {
            error!("retention task failed: {e}");
        }
    }
    log_store_stats(store.as_ref()).await;
    store.close().await?;

    Ok(())
}
