//! Hub configuration
//!
//! Read from a JSON file. Every section is optional, so `{}` runs a hub with
//! an SQLite database in the working directory and no seed servers.
//!
//! ```json
//! {
//!   "scan": { "interval_secs": 60, "probe_timeout_millis": 5000 },
//!   "storage": { "backend": "sqlite", "path": "./craftwatch.db", "retention_days": 365 },
//!   "api": { "host": "0.0.0.0", "port": 5000 },
//!   "servers": [
//!     { "protocol": "java", "address": "mc.example.net" },
//!     { "protocol": "bedrock", "address": "pe.example.net", "port": 19132 }
//!   ]
//! }
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;
use tracing::trace;

use crate::query::QueryConfig;
use crate::registry::NewServer;
use crate::scheduler::{CyclePolicy, ScanConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanSection,
    pub storage: StorageConfig,
    pub api: ApiSection,
    /// Registered at startup when the registry is empty
    pub servers: Vec<NewServer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    pub interval_secs: u64,
    pub probe_timeout_millis: u64,
    pub max_concurrent_probes: usize,
    pub policy: CyclePolicy,
    pub shutdown_grace_secs: u64,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            probe_timeout_millis: 5000,
            max_concurrent_probes: 64,
            policy: CyclePolicy::FixedRate,
            shutdown_grace_secs: 10,
        }
    }
}

impl ScanSection {
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            interval: Duration::from_secs(self.interval_secs),
            probe_timeout: Duration::from_millis(self.probe_timeout_millis),
            max_concurrent_probes: self.max_concurrent_probes,
            policy: self.policy,
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }

    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            probe_timeout: Duration::from_millis(self.probe_timeout_millis),
            max_concurrent_probes: self.max_concurrent_probes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory store and registry, nothing persisted
    #[serde(rename = "none")]
    None,

    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Keep everything when absent
        #[serde(default)]
        retention_days: Option<u32>,

        #[serde(default = "default_cleanup_interval_hours")]
        cleanup_interval_hours: u64,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: None,
            cleanup_interval_hours: default_cleanup_interval_hours(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./craftwatch.db")
}

fn default_cleanup_interval_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub enabled: bool,
    pub host: IpAddr,
    pub port: u16,
    pub auth_token: Option<String>,
    pub enable_cors: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            enabled: true,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            auth_token: None,
            enable_cors: true,
        }
    }
}

impl ApiSection {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Config {
    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scan.interval_secs == 0 {
            bail!("scan.interval_secs must be greater than 0");
        }
        if self.scan.probe_timeout_millis == 0 {
            bail!("scan.probe_timeout_millis must be greater than 0");
        }
        if self.scan.max_concurrent_probes == 0 {
            bail!("scan.max_concurrent_probes must be greater than 0");
        }
        if let StorageConfig::Sqlite {
            retention_days: Some(0),
            ..
        } = self.storage
        {
            bail!("storage.retention_days must be greater than 0");
        }
        for (index, server) in self.servers.iter().enumerate() {
            server
                .resolve()
                .with_context(|| format!("servers[{index}] is invalid"))?;
        }
        Ok(())
    }

    /// Apply `CRAFTWATCH_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Some(host) = crate::util::get_host() {
            self.api.host = host;
        }
        if let Some(port) = crate::util::get_port() {
            self.api.port = port;
        }
        if let Some(token) = crate::util::get_auth_token() {
            self.api.auth_token = Some(token);
        }
    }
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config =
        serde_json::from_str(content).context("Invalid configuration file provided!")?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {path}"))?;
    parse_config(&file_content)
}
