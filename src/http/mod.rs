//! HTTP-facing gateway: the unary `/mcp` endpoint, the SSE stream, and the
//! health check.

pub mod stream;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue, Method};
use axum::response::sse::Sse;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::bridge::correlate::Correlator;
use crate::bridge::process::ProcessSupervisor;
use crate::config::BridgeConfig;
use crate::framing::{self, Message, RequestId};
use crate::{Error, Result};
use stream::StreamChannel;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<ProcessSupervisor>,
    pub correlator: Arc<Correlator>,
    pub streams: Arc<StreamChannel>,
    pub config: Arc<BridgeConfig>,
    /// Counter for ids assigned to requests that arrive without one.
    request_counter: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        correlator: Arc<Correlator>,
        streams: Arc<StreamChannel>,
        config: Arc<BridgeConfig>,
    ) -> Self {
        Self {
            supervisor,
            correlator,
            streams,
            config,
            request_counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(handle_request))
        .route("/mcp/stream", get(handle_stream))
        .route("/health", get(health_check))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

/// CORS layer from the configured origins; `"*"` allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(parsed)
    }
}

/// Handle one JSON-RPC request over HTTP: register, write to the
/// subprocess, await the correlated reply.
async fn handle_request(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> Json<JsonValue> {
    match process_request(&state, body).await {
        Ok(reply) => Json(reply.into_value()),
        Err(e) => {
            warn!("request failed: {e}");
            Json(error_payload(&e))
        }
    }
}

async fn process_request(state: &AppState, body: JsonValue) -> Result<Message> {
    let mut message = Message::new(body);
    if message.id().is_none() {
        let id = state.request_counter.fetch_add(1, Ordering::SeqCst);
        message = message.with_id(json!(id));
    }
    let id = RequestId::from_value(message.id().ok_or(Error::MissingId)?);

    let line = framing::encode_line(&message)?;
    // The guard removes the pending entry whenever this future ends
    // without a reply, including the caller disconnecting mid-wait.
    let pending = state.correlator.register(&id)?;
    state.supervisor.write_line(&line).await?;

    pending.await_resolution(state.config.request_timeout).await
}

/// Map an error to the JSON payload returned to the HTTP caller. Always a
/// structured object, never a propagated panic or hung connection.
fn error_payload(err: &Error) -> JsonValue {
    let text = match err {
        Error::Timeout => "timeout".to_string(),
        Error::ProcessCrashed => "mcp server not running".to_string(),
        Error::NotRunning | Error::BrokenPipe | Error::Startup(_) => {
            "mcp server not started".to_string()
        }
        other => other.to_string(),
    };
    json!({ "error": text })
}

async fn handle_stream(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.streams.open();
    // Explicit keep-alive for HTTP/1.0 clients and proxies that would
    // otherwise close an unbounded response.
    (
        [(header::CONNECTION, "keep-alive")],
        Sse::new(state.streams.heartbeat_stream(session)),
    )
}

/// Liveness of the bridge itself; never depends on subprocess state.
async fn health_check() -> Json<JsonValue> {
    Json(json!({ "status": "healthy", "transport": "http" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payloads_match_the_wire_contract() {
        assert_eq!(error_payload(&Error::Timeout), json!({"error": "timeout"}));
        assert_eq!(
            error_payload(&Error::ProcessCrashed),
            json!({"error": "mcp server not running"})
        );
        assert_eq!(
            error_payload(&Error::NotRunning),
            json!({"error": "mcp server not started"})
        );
        assert_eq!(
            error_payload(&Error::BrokenPipe),
            json!({"error": "mcp server not started"})
        );
        assert_eq!(
            error_payload(&Error::DuplicateId("1".to_string())),
            json!({"error": "Duplicate request id: 1"})
        );
    }

    #[tokio::test]
    async fn health_never_depends_on_the_subprocess() {
        let Json(body) = health_check().await;
        assert_eq!(body, json!({"status": "healthy", "transport": "http"}));
    }

    #[test]
    fn wildcard_and_explicit_cors_layers_build() {
        let _any = cors_layer(&["*".to_string()]);
        let _list = cors_layer(&[
            "https://example.com".to_string(),
            "https://app.example.com".to_string(),
        ]);
    }
}
