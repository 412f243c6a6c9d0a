//! HTTP/SSE bridge for a stdio MCP server.
//!
//! Accepts JSON-RPC messages over HTTP, forwards them to a child MCP
//! server process as newline-delimited JSON on its stdin, and correlates
//! each stdout reply back to the HTTP caller by message id. A streaming
//! endpoint keeps long-lived clients alive with periodic heartbeats.

pub mod bridge;
pub mod config;
pub mod framing;
pub mod http;

mod error;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::{Error, Result};

/// Run a bridge until interrupted, then shut it down in order.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let bridge = Bridge::start(config).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received");

    bridge.shutdown().await;
    Ok(())
}
