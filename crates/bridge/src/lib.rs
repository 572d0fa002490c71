//! Expose `OpenAPI`-described HTTP APIs as MCP tools.
//!
//! Startup is a one-way pipeline: fetch every configured document ([`binding`]), convert and merge
//! them into one immutable [`registry::ToolRegistry`], then serve `tools/list` and `tools/call`
//! over stdio ([`server`]) until the input stream closes.

pub mod binding;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod server;

use crate::binding::acquire_backends;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::registry::ToolRegistry;
use crate::server::{BridgeHandler, serve_stdio};
use std::sync::Arc;

/// Build the registry from `config` and serve MCP on stdin/stdout.
///
/// Unreachable sources are skipped; the server starts even if none load.
///
/// # Errors
///
/// Returns an error if the registry cannot be built (collision under the `fail` policy) or the
/// MCP session fails to initialize.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let backends = acquire_backends(&config.sources).await;
    let registry = ToolRegistry::build(backends, config.collision_policy)?;

    tracing::info!(
        name = %config.name,
        version = %config.version,
        tools = registry.catalog().len(),
        "MCP server running on stdio"
    );
    let handler = BridgeHandler::new(config.name, config.version, Arc::new(registry));
    serve_stdio(handler).await
}
