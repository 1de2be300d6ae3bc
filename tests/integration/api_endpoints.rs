//! Integration tests for API endpoints
//!
//! These tests run the real HTTP server on an ephemeral port and verify:
//! - Bearer authentication on every route
//! - Live status and historical stats responses
//! - Registry mutation through POST/DELETE
//! - JSON error bodies for bad input

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use craftwatch::{
    ServerProtocol,
    api::{ApiConfig, ApiState, spawn_api_server},
    probe::NetworkProber,
    query::{QueryConfig, QueryService},
    registry::MemoryRegistry,
    scheduler::ManualClock,
    storage::{MemoryBackend, MetricsStore, Observation},
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::helpers::{fixed_time, memory_registry, spawn_java_server};

const TOKEN: &str = "test-token";

struct TestApi {
    addr: SocketAddr,
    client: reqwest::Client,
    store: Arc<MemoryBackend>,
    shutdown: CancellationToken,
}

impl TestApi {
    async fn spawn(registry: Arc<MemoryRegistry>) -> Self {
        let store = Arc::new(MemoryBackend::new());
        let query = QueryService::new(
            registry.clone(),
            Arc::new(NetworkProber::new()),
            store.clone(),
            Arc::new(ManualClock::new(fixed_time())),
            QueryConfig {
                probe_timeout: std::time::Duration::from_secs(1),
                max_concurrent_probes: 8,
            },
        );
        let state = ApiState::new(Arc::new(query), registry, store.clone());

        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            auth_token: Some(TOKEN.to_string()),
            enable_cors: true,
        };
        let shutdown = CancellationToken::new();
        let addr = spawn_api_server(config, state, shutdown.clone())
            .await
            .unwrap();

        Self {
            addr,
            client: reqwest::Client::new(),
            store,
            shutdown,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let api = TestApi::spawn(memory_registry(&[]).await).await;

    let response = api.get("/api/v1/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"]["healthy"], true);
    assert!(body["stats"].as_str().unwrap().starts_with("In-Memory"));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let api = TestApi::spawn(memory_registry(&[]).await).await;

    let response = api
        .client
        .get(api.url("/api/v1/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = api
        .client
        .get(api.url("/api/v1/status"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_status_probes_registered_servers() {
    let port = spawn_java_server(9, "api test").await;
    let registry = memory_registry(&[
        (ServerProtocol::Java, "127.0.0.1", port),
        // Nothing listens on port 1
        (ServerProtocol::Java, "127.0.0.1", 1),
    ])
    .await;
    let api = TestApi::spawn(registry).await;

    let response = api.get("/api/v1/status").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["servers"][0]["online"], true);
    assert_eq!(body["servers"][0]["player_count"], 9);
    assert_eq!(body["servers"][0]["protocol"], "java");
    assert_eq!(body["servers"][1]["online"], false);
    assert!(body["servers"][1]["error"].is_string());
    assert!(body["servers"][1].get("player_count").is_none());
}

#[tokio::test]
async fn test_stats_endpoint() {
    let api = TestApi::spawn(memory_registry(&[(ServerProtocol::Java, "mc", 25565)]).await).await;
    let now = fixed_time();
    api.store
        .insert_batch(vec![
            Observation::new(1, 5, 20, now - ChronoDuration::minutes(10)),
            Observation::new(1, 8, 22, now - ChronoDuration::hours(2)),
        ])
        .await
        .unwrap();

    let response = api.get("/api/v1/stats/hour?server_id=1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["window"], "hour");
    assert_eq!(body["server_id"], 1);
    assert_eq!(body["stats"][0]["player_count"], 5);

    let body: Value = api.get("/api/v1/stats/DAY?server_id=1").await.json().await.unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["stats"][0]["player_count"], 8);
}

#[tokio::test]
async fn test_stats_rejects_bad_input() {
    let api = TestApi::spawn(memory_registry(&[]).await).await;

    for path in [
        "/api/v1/stats/week?server_id=1",
        "/api/v1/stats/hour",
        "/api/v1/stats/hour?server_id=abc",
    ] {
        let response = api.get(path).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string(), "{path}");
    }
}

#[tokio::test]
async fn test_add_and_remove_servers() {
    let api = TestApi::spawn(memory_registry(&[]).await).await;

    let response = api
        .client
        .post(api.url("/api/v1/servers"))
        .bearer_auth(TOKEN)
        .json(&json!({"protocol": "bedrock", "address": "pe.example.net"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["port"], 19132);
    let id = created["id"].as_i64().unwrap();

    let listed: Value = api.get("/api/v1/servers").await.json().await.unwrap();
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["servers"][0]["address"], "pe.example.net");

    let response = api
        .client
        .delete(api.url(&format!("/api/v1/servers/{id}")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = api
        .client
        .delete(api.url(&format!("/api/v1/servers/{id}")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_server_rejects_invalid_body() {
    let api = TestApi::spawn(memory_registry(&[]).await).await;

    for body in [
        json!({"protocol": "java", "address": "   "}),
        json!({"protocol": "pocket", "address": "mc.example.net"}),
        json!({"address": "mc.example.net"}),
    ] {
        let response = api
            .client
            .post(api.url("/api/v1/servers"))
            .bearer_auth(TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
    }
}
