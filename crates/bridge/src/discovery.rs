//! The `API-get-input-schema` tool.
//!
//! Listed tools carry an empty input schema to keep `tools/list` small. Callers ask this tool for
//! the real schema before invoking a tool.

use crate::error::{BridgeError, Result};
use crate::registry::ToolRegistry;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde_json::{Value, json};
use std::sync::Arc;

pub const DISCOVERY_TOOL_NAME: &str = "API-get-input-schema";

const DISCOVERY_TOOL_DESCRIPTION: &str = "Get the input schema for a given API. We should always use this tool to get the input schema for a given API before calling the API.";

/// Descriptor of the discovery tool, as published in `tools/list`.
#[must_use]
pub fn discovery_tool() -> Tool {
    let schema = match json!({
        "type": "object",
        "properties": {
            "toolName": {
                "type": "string",
                "description": "The name of the tool to get the input schema for"
            }
        }
    }) {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    Tool::new(DISCOVERY_TOOL_NAME, DISCOVERY_TOOL_DESCRIPTION, Arc::new(schema))
}

/// Return the real input schema of `arguments.toolName` as a text result.
///
/// # Errors
///
/// Returns [`BridgeError::NotFound`] if no catalog entry has that name. A missing or non-string
/// `toolName` is reported with its JSON rendering (e.g. `null`).
pub fn get_input_schema(registry: &ToolRegistry, arguments: &Value) -> Result<CallToolResult> {
    let requested = arguments.get("toolName").unwrap_or(&Value::Null);
    let name = match requested {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let schema = registry
        .find_input_schema(&name)
        .ok_or(BridgeError::NotFound(name))?;
    let text = serde_json::to_string(schema)?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}
