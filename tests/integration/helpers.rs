//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use craftwatch::{
    ServerProtocol,
    probe::{ProbeResult, StatusProber},
    registry::{MemoryRegistry, NewServer, ServerRegistry},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

pub fn fixed_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// What a [`ScriptedProber`] answers for a given address
#[derive(Debug, Clone)]
pub enum Behavior {
    Online { players: u32, latency: u32 },
    Offline(&'static str),
    Hang,
    Panic,
}

/// Prober answering from a table keyed by address
#[derive(Default)]
pub struct ScriptedProber {
    behaviors: HashMap<String, Behavior>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    delay: Duration,
}

impl ScriptedProber {
    pub fn new(behaviors: &[(&str, Behavior)]) -> Self {
        Self {
            behaviors: behaviors
                .iter()
                .map(|(address, behavior)| (address.to_string(), behavior.clone()))
                .collect(),
            ..Self::default()
        }
    }

    /// Every answer is delayed by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProber for ScriptedProber {
    async fn probe(
        &self,
        _protocol: ServerProtocol,
        address: &str,
        _port: u16,
        _timeout: Duration,
    ) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let behavior = self
            .behaviors
            .get(address)
            .cloned()
            .unwrap_or(Behavior::Offline("unknown address"));

        let result = match behavior {
            Behavior::Online { players, latency } => ProbeResult::Online {
                player_count: players,
                latency_millis: latency,
                description: format!("{address} motd"),
            },
            Behavior::Offline(reason) => ProbeResult::offline(reason),
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic => panic!("prober blew up for {address}"),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub async fn memory_registry(servers: &[(ServerProtocol, &str, u16)]) -> Arc<MemoryRegistry> {
    let registry = MemoryRegistry::new();
    for (protocol, address, port) in servers {
        registry
            .add_server(NewServer::new(*protocol, *address, *port))
            .await
            .unwrap();
    }
    Arc::new(registry)
}

// ----------------------------------------------------------------------------
// Fake game servers on 127.0.0.1
// ----------------------------------------------------------------------------

fn varint(mut value: u32, out: &mut Vec<u8>) {
    loop {
        if value & !0x7F == 0 {
            out.push(value as u8);
            return;
        }
        out.push(((value & 0x7F) | 0x80) as u8);
        value >>= 7;
    }
}

async fn read_varint(stream: &mut TcpStream) -> std::io::Result<u32> {
    let mut result = 0u32;
    for shift in 0..5 {
        let byte = stream.read_u8().await?;
        result |= u32::from(byte & 0x7F) << (7 * shift);
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok(result)
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let len = read_varint(stream).await? as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

async fn write_frame(stream: &mut TcpStream, body: &[u8]) -> std::io::Result<()> {
    let mut frame = Vec::with_capacity(body.len() + 5);
    varint(body.len() as u32, &mut frame);
    frame.extend_from_slice(body);
    stream.write_all(&frame).await
}

async fn answer_java(mut stream: TcpStream, status: String) -> std::io::Result<()> {
    read_frame(&mut stream).await?; // handshake
    read_frame(&mut stream).await?; // status request

    let mut response = vec![0x00];
    varint(status.len() as u32, &mut response);
    response.extend_from_slice(status.as_bytes());
    write_frame(&mut stream, &response).await?;

    let ping = read_frame(&mut stream).await?;
    write_frame(&mut stream, &ping).await
}

/// Java edition server answering status + ping on every connection
pub async fn spawn_java_server(players: u32, motd: &str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let status = serde_json::json!({
        "version": {"name": "1.21", "protocol": 767},
        "players": {"max": 100, "online": players},
        "description": {"text": motd}
    })
    .to_string();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(answer_java(stream, status.clone()));
        }
    });

    port
}

/// Accepts TCP connections and never answers
pub async fn spawn_silent_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    port
}

const OFFLINE_MAGIC: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56, 0x78,
];

/// Bedrock edition server answering every unconnected ping
pub async fn spawn_bedrock_server(players: u32, motd: &str) -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let advertisement = format!("MCPE;{motd};594;1.20.0;{players};40;1;Level;Survival;1;{port};{port};");

    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        while let Ok((_, peer)) = socket.recv_from(&mut buf).await {
            let mut pong = vec![0x1c];
            pong.extend_from_slice(&buf[1..9]);
            pong.extend_from_slice(&7i64.to_be_bytes());
            pong.extend_from_slice(&OFFLINE_MAGIC);
            pong.extend_from_slice(&(advertisement.len() as u16).to_be_bytes());
            pong.extend_from_slice(advertisement.as_bytes());
            let _ = socket.send_to(&pong, peer).await;
        }
    });

    port
}
