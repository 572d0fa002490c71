//! MCP server surface.
//!
//! The registry is exposed through an rmcp [`ServerHandler`]; rmcp owns the protocol (framing,
//! `initialize`, `ping`, request concurrency). Only protocol messages go to stdout.

use crate::dispatch::invoke;
use crate::error::{BridgeError, Result};
use crate::registry::ToolRegistry;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{RoleServer, ServerHandler, ServiceExt as _};
use serde_json::{Value, json};
use std::sync::Arc;

/// Serves `tools/list` and `tools/call` from one immutable registry. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BridgeHandler {
    name: String,
    version: String,
    registry: Arc<ToolRegistry>,
}

impl BridgeHandler {
    #[must_use]
    pub fn new(name: String, version: String, registry: Arc<ToolRegistry>) -> Self {
        Self {
            name,
            version,
            registry,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

impl ServerHandler for BridgeHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = std::result::Result<ListToolsResult, ErrorData>> + Send + '_ {
        tracing::debug!("list tools");
        std::future::ready(Ok(ListToolsResult {
            tools: self.registry.list_tools().to_vec(),
            ..Default::default()
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = std::result::Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let arguments = request.arguments.map_or_else(|| json!({}), Value::Object);
            tracing::debug!(tool = %request.name, "call tool");
            invoke(&self.registry, &request.name, arguments)
                .await
                .map_err(to_error_data)
        }
    }
}

/// Unknown tools are the caller's mistake; everything else is ours.
fn to_error_data(e: BridgeError) -> ErrorData {
    match e {
        BridgeError::NotFound(_) => ErrorData::invalid_params(e.to_string(), None),
        _ => ErrorData::internal_error(e.to_string(), None),
    }
}

/// Serve MCP on stdin/stdout until the client disconnects.
///
/// # Errors
///
/// Returns an error if the `initialize` handshake fails or the service task panics.
pub async fn serve_stdio(handler: BridgeHandler) -> Result<()> {
    let service = handler
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|e| BridgeError::Mcp(format!("initialize failed: {e}")))?;

    let reason = service
        .waiting()
        .await
        .map_err(|e| BridgeError::Mcp(format!("service task failed: {e}")))?;
    tracing::info!(reason = ?reason, "MCP session ended");
    Ok(())
}
