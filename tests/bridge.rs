//! End-to-end tests: a real bridge on an ephemeral port talking to shell
//! scripts standing in for the MCP server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};

use mcp_http_bridge::bridge::correlate::Correlator;
use mcp_http_bridge::bridge::process::ProcessSupervisor;
use mcp_http_bridge::http::stream::StreamChannel;
use mcp_http_bridge::http::{build_router, AppState};
use mcp_http_bridge::{Bridge, BridgeConfig};

fn write_script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("server.sh");
    std::fs::write(&path, body).unwrap();
    path
}

fn test_config(script: PathBuf) -> BridgeConfig {
    BridgeConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        runtime: Some(PathBuf::from("/bin/sh")),
        server_path: script,
        request_timeout: Duration::from_millis(500),
        heartbeat_interval: Duration::from_millis(50),
        shutdown_grace: Duration::from_millis(500),
        ..Default::default()
    }
}

async fn post_mcp(addr: std::net::SocketAddr, body: Value) -> Value {
    reqwest::Client::new()
        .post(format!("http://{addr}/mcp"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn round_trip_through_an_echo_server() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(write_script(&dir, "exec cat\n"));
    let bridge = Bridge::start(config).await.unwrap();

    let reply = post_mcp(bridge.local_addr(), json!({"id": 1, "method": "ping"})).await;
    assert_eq!(reply["id"], json!(1));
    assert_eq!(reply["method"], json!("ping"));

    bridge.shutdown().await;
}

#[tokio::test]
async fn concurrent_requests_survive_reply_reordering() {
    let dir = tempfile::tempdir().unwrap();
    // Reads both requests, then replies in reverse order.
    let script = write_script(
        &dir,
        "read a\nread b\nprintf '%s\\n%s\\n' \"$b\" \"$a\"\n",
    );
    let mut config = test_config(script);
    config.request_timeout = Duration::from_secs(5);
    let bridge = Bridge::start(config).await.unwrap();
    let addr = bridge.local_addr();

    let first = tokio::spawn(async move { post_mcp(addr, json!({"id": 1, "method": "a"})).await });
    let second = tokio::spawn(async move { post_mcp(addr, json!({"id": 2, "method": "b"})).await });

    let reply1 = first.await.unwrap();
    let reply2 = second.await.unwrap();
    assert_eq!(reply1["id"], json!(1));
    assert_eq!(reply1["method"], json!("a"));
    assert_eq!(reply2["id"], json!(2));
    assert_eq!(reply2["method"], json!("b"));

    bridge.shutdown().await;
}

#[tokio::test]
async fn silent_server_yields_a_timeout_error() {
    let dir = tempfile::tempdir().unwrap();
    // Never replies, never exits.
    let config = test_config(write_script(&dir, "exec sleep 60\n"));
    let bridge = Bridge::start(config).await.unwrap();

    let reply = post_mcp(bridge.local_addr(), json!({"id": 1, "method": "ping"})).await;
    assert_eq!(reply, json!({"error": "timeout"}));

    bridge.shutdown().await;
}

#[tokio::test]
async fn crash_mid_request_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    // Dies after consuming the first request.
    let config = test_config(write_script(&dir, "read line\nexit 1\n"));
    let bridge = Bridge::start(config).await.unwrap();

    let reply = post_mcp(bridge.local_addr(), json!({"id": 1, "method": "ping"})).await;
    assert_eq!(reply, json!({"error": "mcp server not running"}));

    bridge.shutdown().await;
}

#[tokio::test]
async fn stopped_server_yields_not_started_and_health_stays_up() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(write_script(&dir, "exec cat\n")));

    // Wire the gateway by hand so the supervisor can be stopped underneath it.
    let correlator = Arc::new(Correlator::new());
    let supervisor = Arc::new(
        ProcessSupervisor::spawn(&config, Arc::clone(&correlator))
            .await
            .unwrap(),
    );
    supervisor.stop(Duration::from_millis(500)).await;

    let streams = Arc::new(StreamChannel::new(config.heartbeat_interval));
    let state = AppState::new(
        Arc::clone(&supervisor),
        correlator,
        streams,
        Arc::clone(&config),
    );
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await });

    let reply = post_mcp(addr, json!({"id": 1, "method": "ping"})).await;
    assert_eq!(reply, json!({"error": "mcp server not started"}));

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "healthy", "transport": "http"}));
}

#[tokio::test]
async fn stream_emits_heartbeats_and_shutdown_ends_it() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(write_script(&dir, "exec cat\n"));
    let bridge = Bridge::start(config).await.unwrap();

    let response = reqwest::get(format!("http://{}/mcp/stream", bridge.local_addr()))
        .await
        .unwrap();
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(
        response.headers().get("connection").unwrap(),
        "keep-alive"
    );

    let mut body = response.bytes_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .expect("heartbeat within one interval")
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(&chunk);
    assert!(text.contains("heartbeat"), "unexpected event: {text}");

    // Shutting down the bridge ends the open stream cleanly.
    bridge.shutdown().await;
    let end = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(chunk) = body.next().await {
            if chunk.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(end.is_ok(), "stream did not terminate after shutdown");
}
