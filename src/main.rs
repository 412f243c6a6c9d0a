use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mcp_http_bridge::BridgeConfig;

/// HTTP/SSE bridge for a stdio MCP server
#[derive(Debug, Parser)]
#[command(name = "mcp-http-bridge", version)]
struct Args {
    /// HTTP bind host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// HTTP bind port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Path to the MCP server entry point
    #[arg(long, default_value = "../build/index.js")]
    server: PathBuf,

    /// Runtime used to launch the server (defaults to node from PATH)
    #[arg(long)]
    runtime: Option<PathBuf>,

    /// Allowed CORS origin; repeat for several (defaults to all origins)
    #[arg(long = "cors-origin", value_name = "ORIGIN")]
    cors_origins: Vec<String>,

    /// Unary request timeout in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout: u64,

    /// SSE heartbeat interval in seconds
    #[arg(long, default_value_t = 30)]
    heartbeat_interval: u64,
}

#[tokio::main]
async fn main() -> mcp_http_bridge::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mcp_http_bridge=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = BridgeConfig {
        host: args.host,
        port: args.port,
        server_path: args.server,
        runtime: args.runtime,
        cors_origins: if args.cors_origins.is_empty() {
            vec!["*".to_string()]
        } else {
            args.cors_origins
        },
        request_timeout: Duration::from_secs(args.request_timeout),
        heartbeat_interval: Duration::from_secs(args.heartbeat_interval),
        ..Default::default()
    };

    mcp_http_bridge::run(config).await
}
