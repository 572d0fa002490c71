//! Error types for the bridge.

use thiserror::Error;

/// Main error type for the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Unknown tool name (in discovery or invocation)
    #[error("Method {0} not found")]
    NotFound(String),

    /// Invocation failures that are not HTTP status responses (transport, bad arguments)
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Configuration errors (invalid YAML, missing fields)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup errors (registry could not be built)
    #[error("Startup error: {0}")]
    Startup(String),

    /// MCP session errors (handshake failure, service task panic)
    #[error("MCP error: {0}")]
    Mcp(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
