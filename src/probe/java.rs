//! Java edition status query (Server List Ping over TCP)
//!
//! ```text
//! C → S  Handshake       [len][0x00][protocol][address][port][next_state=1]
//! C → S  Status request  [len][0x00]
//! S → C  Status response [len][0x00][json]
//! C → S  Ping            [len][0x01][i64 payload]
//! S → C  Pong            [len][0x01][i64 payload]
//! ```
//!
//! All lengths and ids are VarInts; strings are VarInt-prefixed UTF-8.

use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::{ProbeError, ServerStatus, StatusProtocol, duration_to_millis};

/// Protocol version sent in the handshake; servers answer status for any version
const STATUS_PROTOCOL_VERSION: i32 = 47;

const HANDSHAKE_PACKET_ID: i32 = 0x00;
const STATUS_PACKET_ID: i32 = 0x00;
const PING_PACKET_ID: i32 = 0x01;

/// Upper bound on a single packet read from the server
const MAX_PACKET_LEN: i32 = 1024 * 1024;

/// Java edition status capability
#[derive(Debug, Clone)]
pub struct JavaStatus {
    protocol_version: i32,
}

impl JavaStatus {
    pub fn new() -> Self {
        Self {
            protocol_version: STATUS_PROTOCOL_VERSION,
        }
    }
}

impl Default for JavaStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    players: Players,
    #[serde(default)]
    description: Value,
}

#[derive(Debug, Deserialize)]
struct Players {
    online: u32,
}

#[async_trait]
impl StatusProtocol for JavaStatus {
    async fn query(&self, address: &str, port: u16) -> Result<ServerStatus, ProbeError> {
        let mut stream = TcpStream::connect((address, port)).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("failed to set TCP_NODELAY for {address}:{port}: {e}");
        }

        let mut handshake = Vec::with_capacity(address.len() + 16);
        write_varint(&mut handshake, HANDSHAKE_PACKET_ID);
        write_varint(&mut handshake, self.protocol_version);
        write_string(&mut handshake, address);
        handshake.extend_from_slice(&port.to_be_bytes());
        write_varint(&mut handshake, 1);

        let mut request = Vec::with_capacity(1);
        write_varint(&mut request, STATUS_PACKET_ID);

        stream.write_all(&frame(&handshake)).await?;
        stream.write_all(&frame(&request)).await?;

        let packet = read_packet(&mut stream).await?;
        let mut body = packet.as_slice();
        let packet_id = read_varint(&mut body)?;
        if packet_id != STATUS_PACKET_ID {
            return Err(ProbeError::Protocol(format!(
                "unexpected status packet id {packet_id:#04x}"
            )));
        }
        let json = read_string(&mut body)?;
        trace!("status response from {address}:{port}: {json}");

        let response: StatusResponse = serde_json::from_str(&json)
            .map_err(|e| ProbeError::Protocol(format!("invalid status JSON: {e}")))?;

        let payload = chrono::Utc::now().timestamp_millis();
        let mut ping = Vec::with_capacity(9);
        write_varint(&mut ping, PING_PACKET_ID);
        ping.extend_from_slice(&payload.to_be_bytes());

        let started = Instant::now();
        stream.write_all(&frame(&ping)).await?;
        let pong = read_packet(&mut stream).await?;
        let latency = started.elapsed();

        let mut body = pong.as_slice();
        let pong_id = read_varint(&mut body)?;
        if pong_id != PING_PACKET_ID || body != payload.to_be_bytes().as_slice() {
            return Err(ProbeError::Protocol("malformed pong".to_string()));
        }

        Ok(ServerStatus {
            player_count: response.players.online,
            latency_millis: duration_to_millis(latency),
            description: flatten_description(&response.description),
        })
    }
}

/// Reduce a description (plain string or chat component) to plain text
fn flatten_description(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts.iter().map(flatten_description).collect(),
        Value::Object(component) => {
            let mut text = component
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if let Some(Value::Array(extra)) = component.get("extra") {
                for part in extra {
                    text.push_str(&flatten_description(part));
                }
            }
            text
        }
        _ => String::new(),
    }
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(payload.len() + 5);
    write_varint(&mut packet, payload.len() as i32);
    packet.extend_from_slice(payload);
    packet
}

fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.push(value as u8);
            return;
        }
        buf.push(((value & 0x7F) | 0x80) as u8);
        value >>= 7;
    }
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_varint(buf, value.len() as i32);
    buf.extend_from_slice(value.as_bytes());
}

fn read_varint(cursor: &mut &[u8]) -> Result<i32, ProbeError> {
    let mut result: u32 = 0;
    for shift in 0..5 {
        let (&byte, rest) = cursor
            .split_first()
            .ok_or_else(|| ProbeError::Protocol("truncated VarInt".to_string()))?;
        *cursor = rest;
        result |= u32::from(byte & 0x7F) << (7 * shift);
        if byte & 0x80 == 0 {
            return Ok(result as i32);
        }
    }
    Err(ProbeError::Protocol("VarInt longer than 5 bytes".to_string()))
}

fn read_string(cursor: &mut &[u8]) -> Result<String, ProbeError> {
    let len = read_varint(cursor)?;
    let len = usize::try_from(len)
        .map_err(|_| ProbeError::Protocol(format!("negative string length {len}")))?;
    if cursor.len() < len {
        return Err(ProbeError::Protocol("truncated string".to_string()));
    }
    let (bytes, rest) = cursor.split_at(len);
    *cursor = rest;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ProbeError::Protocol(format!("string is not UTF-8: {e}")))
}

async fn read_varint_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, ProbeError> {
    let mut result: u32 = 0;
    for shift in 0..5 {
        let byte = reader.read_u8().await?;
        result |= u32::from(byte & 0x7F) << (7 * shift);
        if byte & 0x80 == 0 {
            return Ok(result as i32);
        }
    }
    Err(ProbeError::Protocol("VarInt longer than 5 bytes".to_string()))
}

/// Read one length-prefixed packet, returning everything after the length
async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProbeError> {
    let len = read_varint_from(reader).await?;
    if len <= 0 || len > MAX_PACKET_LEN {
        return Err(ProbeError::Protocol(format!("invalid packet length {len}")));
    }
    let mut packet = vec![0u8; len as usize];
    reader.read_exact(&mut packet).await?;
    Ok(packet)
}
