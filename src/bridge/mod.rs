//! Bridge orchestration: startup order and coordinated shutdown.
//!
//! The subprocess must be running before the HTTP listener accepts its
//! first connection; shutdown runs the other way around.

pub mod correlate;
pub mod process;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bridge::correlate::{Correlator, FailureKind};
use crate::bridge::process::ProcessSupervisor;
use crate::config::BridgeConfig;
use crate::http::stream::StreamChannel;
use crate::http::{self, AppState};
use crate::Result;

/// A running bridge instance. Multiple instances are safe in one process;
/// nothing here is global.
pub struct Bridge {
    supervisor: Arc<ProcessSupervisor>,
    correlator: Arc<Correlator>,
    streams: Arc<StreamChannel>,
    config: Arc<BridgeConfig>,
    accept_token: CancellationToken,
    serve_handle: JoinHandle<std::io::Result<()>>,
    local_addr: SocketAddr,
}

impl Bridge {
    /// Start the subprocess, then the HTTP listener. A subprocess startup
    /// failure aborts the whole bridge.
    pub async fn start(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let correlator = Arc::new(Correlator::new());
        let supervisor =
            Arc::new(ProcessSupervisor::spawn(&config, Arc::clone(&correlator)).await?);
        let streams = Arc::new(StreamChannel::new(config.heartbeat_interval));

        let state = AppState::new(
            Arc::clone(&supervisor),
            Arc::clone(&correlator),
            Arc::clone(&streams),
            Arc::clone(&config),
        );
        let router = http::build_router(state);

        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "HTTP transport listening");

        let accept_token = CancellationToken::new();
        let shutdown = accept_token.clone();
        let serve_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        });

        Ok(Self {
            supervisor,
            correlator,
            streams,
            config,
            accept_token,
            serve_handle,
            local_addr,
        })
    }

    /// The bound address; useful when the configured port is 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Ordered shutdown: stop accepting connections, end stream sessions,
    /// fail pending requests, then stop the subprocess.
    pub async fn shutdown(self) {
        info!("shutting down bridge");
        self.accept_token.cancel();
        self.streams.shutdown();
        self.correlator.fail_all(FailureKind::Shutdown);

        match self.serve_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("HTTP server error during shutdown: {e}"),
            Err(e) => error!("HTTP server task failed: {e}"),
        }

        self.supervisor.stop(self.config.shutdown_grace).await;
        info!("bridge stopped");
    }
}
