//! Bedrock edition status query (RakNet unconnected ping over UDP)
//!
//! ```text
//! C → S  [0x01][i64 time][16 byte magic][i64 client guid]
//! S → C  [0x1c][i64 time][i64 server guid][16 byte magic][u16 len][advertisement]
//! ```
//!
//! The advertisement is a `;`-separated string:
//! `edition;motd;protocol;version;players_online;max_players;server_id;...`

use std::time::Instant;

use async_trait::async_trait;
use tokio::net::{UdpSocket, lookup_host};
use tracing::trace;

use super::{ProbeError, ServerStatus, StatusProtocol, duration_to_millis};

const UNCONNECTED_PING: u8 = 0x01;
const UNCONNECTED_PONG: u8 = 0x1c;

/// RakNet offline message marker
const OFFLINE_MAGIC: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56, 0x78,
];

/// id + time + guid + magic + string length
const PONG_HEADER_LEN: usize = 1 + 8 + 8 + 16 + 2;

const MAX_DATAGRAM_LEN: usize = 2048;

/// Bedrock edition status capability
#[derive(Debug, Clone)]
pub struct BedrockStatus {
    client_guid: i64,
}

impl BedrockStatus {
    pub fn new() -> Self {
        let nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        Self {
            client_guid: nanos ^ i64::from(std::process::id()),
        }
    }
}

impl Default for BedrockStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusProtocol for BedrockStatus {
    async fn query(&self, address: &str, port: u16) -> Result<ServerStatus, ProbeError> {
        let target = lookup_host((address, port))
            .await?
            .next()
            .ok_or_else(|| ProbeError::Network(format!("could not resolve {address}")))?;

        let bind_addr = if target.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(target).await?;

        let ping = encode_ping(chrono::Utc::now().timestamp_millis(), self.client_guid);

        let started = Instant::now();
        socket.send(&ping).await?;
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        let len = socket.recv(&mut buf).await?;
        let latency = started.elapsed();

        let advertisement = decode_pong(&buf[..len])?;
        trace!("advertisement from {target}: {advertisement}");

        let (player_count, description) = parse_advertisement(&advertisement)?;

        Ok(ServerStatus {
            player_count,
            latency_millis: duration_to_millis(latency),
            description,
        })
    }
}

fn encode_ping(time: i64, client_guid: i64) -> Vec<u8> {
    let mut packet = Vec::with_capacity(1 + 8 + 16 + 8);
    packet.push(UNCONNECTED_PING);
    packet.extend_from_slice(&time.to_be_bytes());
    packet.extend_from_slice(&OFFLINE_MAGIC);
    packet.extend_from_slice(&client_guid.to_be_bytes());
    packet
}

fn decode_pong(packet: &[u8]) -> Result<String, ProbeError> {
    if packet.len() < PONG_HEADER_LEN {
        return Err(ProbeError::Protocol(format!(
            "pong too short: {} bytes",
            packet.len()
        )));
    }
    if packet[0] != UNCONNECTED_PONG {
        return Err(ProbeError::Protocol(format!(
            "unexpected packet id {:#04x}",
            packet[0]
        )));
    }
    if packet[17..33] != OFFLINE_MAGIC {
        return Err(ProbeError::Protocol("missing offline magic".to_string()));
    }

    let len = u16::from_be_bytes([packet[33], packet[34]]) as usize;
    let body = packet
        .get(PONG_HEADER_LEN..PONG_HEADER_LEN + len)
        .ok_or_else(|| ProbeError::Protocol("truncated advertisement".to_string()))?;

    String::from_utf8(body.to_vec())
        .map_err(|e| ProbeError::Protocol(format!("advertisement is not UTF-8: {e}")))
}

/// Extract (players online, motd) from the advertisement string
fn parse_advertisement(advertisement: &str) -> Result<(u32, String), ProbeError> {
    let fields: Vec<&str> = advertisement.split(';').collect();
    if fields.len() < 6 {
        return Err(ProbeError::Protocol(format!(
            "advertisement has {} fields, expected at least 6",
            fields.len()
        )));
    }

    let players = fields[4].trim().parse::<u32>().map_err(|e| {
        ProbeError::Protocol(format!("invalid player count '{}': {e}", fields[4]))
    })?;

    Ok((players, fields[1].to_string()))
}
