//! Error types for the MCP HTTP bridge

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to start MCP server: {0}")]
    Startup(String),

    #[error("MCP server is not running")]
    NotRunning,

    #[error("Broken pipe to MCP server")]
    BrokenPipe,

    #[error("MCP server crashed")]
    ProcessCrashed,

    #[error("Request timed out")]
    Timeout,

    #[error("Duplicate request id: {0}")]
    DuplicateId(String),

    #[error("Malformed frame: {0}")]
    Framing(String),

    #[error("Message has no id")]
    MissingId,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;
