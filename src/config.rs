//! Bridge configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Immutable bridge configuration, shared by all components.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// HTTP bind host
    pub host: String,

    /// HTTP bind port (0 picks an ephemeral port)
    pub port: u16,

    /// Allowed CORS origins; `"*"` allows any origin
    pub cors_origins: Vec<String>,

    /// Path to the MCP server entry point (a Node.js script)
    pub server_path: PathBuf,

    /// Runtime used to launch the server script. When unset, `node` is
    /// resolved from PATH.
    pub runtime: Option<PathBuf>,

    /// How long a unary request may wait for its reply
    pub request_timeout: Duration,

    /// Interval between SSE heartbeat events
    pub heartbeat_interval: Duration,

    /// How long to wait for the subprocess to exit before killing it
    pub shutdown_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            server_path: PathBuf::from("../build/index.js"),
            runtime: None,
            request_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request_timeout must be positive".to_string()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::Config("heartbeat_interval must be positive".to_string()));
        }
        if self.host.is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        Ok(())
    }
}
