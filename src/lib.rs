pub mod config;
pub mod probe;
pub mod query;
pub mod registry;
pub mod scheduler;
pub mod storage;
pub mod util;

#[cfg(feature = "api")]
pub mod api;

use serde::{Deserialize, Serialize};

/// Identifier of a monitored server, assigned by the registry
pub type ServerId = i64;

/// Default port of a Java edition server
pub const JAVA_DEFAULT_PORT: u16 = 25565;

/// Default port of a Bedrock edition server
pub const BEDROCK_DEFAULT_PORT: u16 = 19132;

/// Wire protocol family a server speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerProtocol {
    /// Server List Ping over TCP
    Java,
    /// RakNet unconnected ping over UDP
    Bedrock,
}

impl ServerProtocol {
    pub fn default_port(&self) -> u16 {
        match self {
            ServerProtocol::Java => JAVA_DEFAULT_PORT,
            ServerProtocol::Bedrock => BEDROCK_DEFAULT_PORT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerProtocol::Java => "java",
            ServerProtocol::Bedrock => "bedrock",
        }
    }
}

impl std::fmt::Display for ServerProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServerProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "java" => Ok(ServerProtocol::Java),
            "bedrock" => Ok(ServerProtocol::Bedrock),
            other => Err(format!("unknown protocol '{other}' (expected 'java' or 'bedrock')")),
        }
    }
}

/// A server registered for monitoring
///
/// Owned by the registry; the scan pipeline only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredServer {
    pub id: ServerId,
    pub protocol: ServerProtocol,
    pub address: String,
    pub port: u16,
}

impl MonitoredServer {
    /// "address:port" label used in logs
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
