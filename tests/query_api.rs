//! Query API over real HTTP.

use std::net::SocketAddr;
use std::time::Duration;

use alloy::primitives::Address;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use seed_node::api::{ApiState, NodeInfo, QueryApi};
use seed_node::discovery::RoutingTable;
use seed_node::lifecycle::Phase;
use seed_node::network::TransportKind;

struct TestApi {
    base: String,
    token: CancellationToken,
    phase: watch::Sender<Phase>,
    table: RoutingTable,
    handle: JoinHandle<std::io::Result<()>>,
}

async fn spawn_api(api_key: Option<&str>) -> TestApi {
    let table = RoutingTable::new();
    let (phase, phase_rx) = watch::channel(Phase::Running);
    let state = ApiState::new(
        table.clone(),
        NodeInfo {
            address: Address::repeat_byte(0xaa),
            endpoint: "203.0.113.5:30303".into(),
            transport_kind: TransportKind::Direct,
            protocol_version: "seed/1".into(),
            static_peers: 2,
        },
        phase_rx,
        api_key.map(str::to_string),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let api = QueryApi::new(addr, state);
    let token = CancellationToken::new();
    let serve_token = token.clone();
    let handle = tokio::spawn(async move { api.serve(listener, serve_token).await });

    TestApi {
        base: format!("http://{}", addr),
        token,
        phase,
        table,
        handle,
    }
}

#[tokio::test]
async fn test_status_reports_table_size() {
    let api = spawn_api(None).await;
    api.table.insert_or_touch(Address::repeat_byte(1), "10.0.0.1:30303");
    api.table.insert_or_touch(Address::repeat_byte(2), "10.0.0.2:30303");

    let body: Value = reqwest::get(format!("{}/status", api.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["peers"], 2);
    assert_eq!(body["static_peers"], 2);
    assert_eq!(body["phase"], "running");
    assert_eq!(body["transport"], "direct");
    assert_eq!(body["endpoint"], "203.0.113.5:30303");
}

#[tokio::test]
async fn test_peers_and_single_peer_lookup() {
    let api = spawn_api(None).await;
    let known = Address::repeat_byte(7);
    api.table.insert_or_touch(known, "10.0.0.7:30303");

    let peers: Vec<Value> = reqwest::get(format!("{}/peers", api.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0]["endpoint"], "10.0.0.7:30303");

    let found = reqwest::get(format!("{}/peers/{}", api.base, known))
        .await
        .unwrap();
    assert_eq!(found.status(), StatusCode::OK);

    let unknown = reqwest::get(format!("{}/peers/{}", api.base, Address::repeat_byte(8)))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let malformed = reqwest::get(format!("{}/peers/not-an-address", api.base))
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_follows_phase() {
    let api = spawn_api(None).await;
    let url = format!("{}/health", api.base);

    assert_eq!(reqwest::get(&url).await.unwrap().status(), StatusCode::OK);

    api.phase.send_replace(Phase::ShuttingDown);
    let res = reqwest::get(&url).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["phase"], "shutting_down");
}

#[tokio::test]
async fn test_api_key_required_except_health() {
    let api = spawn_api(Some("sekrit")).await;
    let client = reqwest::Client::new();

    let denied = client.get(format!("{}/peers", api.base)).send().await.unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let wrong = client
        .get(format!("{}/peers", api.base))
        .bearer_auth("guess")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let allowed = client
        .get(format!("{}/peers", api.base))
        .bearer_auth("sekrit")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);

    let health = client.get(format!("{}/health", api.base)).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cancellation_stops_server() {
    let api = spawn_api(None).await;
    api.token.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), api.handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
