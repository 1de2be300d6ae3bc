//! SQLite storage backend implementation
//!
//! Stores observations and the server registry in one local database file.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers are not blocked by the scheduler's writes
//! - **Connection pooling**: Concurrent probe tasks share a small pool
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Removing a server cascades to its observations.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, MetricsStore};
use super::error::{StorageError, StorageResult};
use super::schema::Observation;
use crate::registry::{NewServer, RegistryError, RegistryReader, RegistryResult, ServerRegistry};
use crate::{MonitoredServer, ServerId, ServerProtocol};

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

type ObservationRow = (i64, i64, i64, i64);
type ServerRow = (i64, String, String, i64);

impl SqliteBackend {
    /// Open (or create) the database at `db_path` and run migrations
    ///
    /// ```no_run
    /// # use craftwatch::storage::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./craftwatch.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("SQLite backend ready");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_micros(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_micros()
    }

    /// Lower bound in stored units; a sub-microsecond remainder rounds up so
    /// `observed_at >= bound` never admits a row older than `dt`
    fn bound_to_micros(dt: &DateTime<Utc>) -> i64 {
        let micros = dt.timestamp_micros();
        if dt.timestamp_subsec_nanos() % 1_000 == 0 {
            micros
        } else {
            micros.saturating_add(1)
        }
    }

    fn micros_to_timestamp(micros: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(micros).unwrap_or_default()
    }

    fn observation_from_row((server_id, player_count, latency_millis, observed_at): ObservationRow) -> Observation {
        Observation {
            server_id,
            player_count: u32::try_from(player_count).unwrap_or_default(),
            latency_millis: u32::try_from(latency_millis).unwrap_or(u32::MAX),
            observed_at: Self::micros_to_timestamp(observed_at),
        }
    }

    fn server_from_row((id, protocol, address, port): ServerRow) -> RegistryResult<MonitoredServer> {
        let protocol = ServerProtocol::from_str(&protocol).map_err(RegistryError::Unavailable)?;
        let port = u16::try_from(port)
            .map_err(|_| RegistryError::Unavailable(format!("stored port {port} out of range")))?;
        Ok(MonitoredServer {
            id,
            protocol,
            address,
            port,
        })
    }
}

#[async_trait]
impl MetricsStore for SqliteBackend {
    #[instrument(skip(self, observation), fields(server_id = observation.server_id))]
    async fn insert(&self, observation: Observation) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO observations (server_id, player_count, latency_millis, observed_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(observation.server_id)
        .bind(i64::from(observation.player_count))
        .bind(i64::from(observation.latency_millis))
        .bind(Self::timestamp_to_micros(&observation.observed_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, observations), fields(count = observations.len()))]
    async fn insert_batch(&self, observations: Vec<Observation>) -> StorageResult<()> {
        if observations.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for observation in observations {
            sqlx::query(
                r#"
                INSERT INTO observations (server_id, player_count, latency_millis, observed_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(observation.server_id)
            .bind(i64::from(observation.player_count))
            .bind(i64::from(observation.latency_millis))
            .bind(Self::timestamp_to_micros(&observation.observed_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!("batch insert complete");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query(
        &self,
        server_id: ServerId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Observation>> {
        let rows: Vec<ObservationRow> = sqlx::query_as(
            r#"
            SELECT server_id, player_count, latency_millis, observed_at
            FROM observations
            WHERE server_id = ? AND observed_at >= ?
            ORDER BY observed_at ASC, id ASC
            "#,
        )
        .bind(server_id)
        .bind(Self::bound_to_micros(&since))
        .fetch_all(&self.pool)
        .await?;

        debug!("fetched {} observations", rows.len());

        Ok(rows.into_iter().map(Self::observation_from_row).collect())
    }

    async fn count(&self) -> StorageResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM observations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_old_observations(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        info!("cleaning up observations older than {}", before);

        let result = sqlx::query("DELETE FROM observations WHERE observed_at < ?")
            .bind(Self::bound_to_micros(&before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old observations", deleted);

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite backend operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<String> {
        let (total_rows, oldest, newest): (i64, Option<i64>, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(*), MIN(observed_at), MAX(observed_at) FROM observations",
        )
        .fetch_one(&self.pool)
        .await?;

        let file_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);
        let file_size_mb = file_size as f64 / 1_000_000.0;

        let time_range = match (oldest, newest) {
            (Some(old), Some(new)) => format!(
                "{} to {}",
                Self::micros_to_timestamp(old).format("%Y-%m-%d"),
                Self::micros_to_timestamp(new).format("%Y-%m-%d")
            ),
            _ => "no data".to_string(),
        };

        Ok(format!(
            "SQLite: {} rows, {:.2} MB on disk, time range: {}",
            total_rows, file_size_mb, time_range
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl RegistryReader for SqliteBackend {
    async fn list_servers(&self) -> RegistryResult<Vec<MonitoredServer>> {
        let rows: Vec<ServerRow> =
            sqlx::query_as("SELECT id, protocol, address, port FROM servers ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Self::server_from_row).collect()
    }
}

#[async_trait]
impl ServerRegistry for SqliteBackend {
    #[instrument(skip(self))]
    async fn add_server(&self, server: NewServer) -> RegistryResult<MonitoredServer> {
        let (protocol, address, port) = server.resolve()?;

        let result = sqlx::query("INSERT INTO servers (protocol, address, port) VALUES (?, ?, ?)")
            .bind(protocol.as_str())
            .bind(&address)
            .bind(i64::from(port))
            .execute(&self.pool)
            .await?;

        let server = MonitoredServer {
            id: result.last_insert_rowid(),
            protocol,
            address,
            port,
        };
        info!("registered server {} ({})", server.id, server.endpoint());
        Ok(server)
    }

    #[instrument(skip(self))]
    async fn remove_server(&self, id: ServerId) -> RegistryResult<bool> {
        let result = sqlx::query("DELETE FROM servers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_server(&self, id: ServerId) -> RegistryResult<Option<MonitoredServer>> {
        let row: Option<ServerRow> =
            sqlx::query_as("SELECT id, protocol, address, port FROM servers WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::server_from_row).transpose()
    }
}
