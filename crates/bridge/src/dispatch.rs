//! Tool invocation.

use crate::discovery::{DISCOVERY_TOOL_NAME, get_input_schema};
use crate::error::{BridgeError, Result};
use crate::registry::ToolRegistry;
use apibridge_openapi_tools::client::HttpClientError;
use rmcp::model::{CallToolResult, Content};
use serde_json::{Map, Value};

/// Invoke a tool by name.
///
/// HTTP error statuses from the backend are returned as a successful result whose text is a
/// `{"status":"error", ...}` object, so the caller can reason about them as data.
///
/// # Errors
///
/// - [`BridgeError::NotFound`] if `name` is not a registered tool
/// - [`BridgeError::Dispatch`] if the backend could not be reached or the arguments could not be
///   turned into a request
pub async fn invoke(
    registry: &ToolRegistry,
    name: &str,
    arguments: Value,
) -> Result<CallToolResult> {
    if name == DISCOVERY_TOOL_NAME {
        return get_input_schema(registry, &arguments);
    }

    let entry = registry
        .resolve(name)
        .ok_or_else(|| BridgeError::NotFound(name.to_string()))?;

    tracing::debug!(
        tool = %name,
        spec = %entry.backend.location,
        method = %entry.operation.method,
        path = %entry.operation.path,
        "invoking tool"
    );

    match entry
        .backend
        .client
        .execute_operation(&entry.operation, &arguments)
        .await
    {
        Ok(response) => {
            tracing::debug!(tool = %name, status = response.status, "tool call succeeded");
            text_result(&response.data)
        }
        Err(HttpClientError::Status { status, data, .. }) => {
            tracing::debug!(tool = %name, status, "backend returned an error status");
            text_result(&normalize_error_payload(data))
        }
        Err(e) => {
            tracing::warn!(tool = %name, error = %e, "tool call failed");
            Err(BridgeError::Dispatch(e.to_string()))
        }
    }
}

fn text_result(value: &Value) -> Result<CallToolResult> {
    let text = serde_json::to_string(value)?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// Shape a backend error body as `{"status":"error", ...}`.
///
/// A nested `response.data` wins over the raw body. Object payloads are merged into the result
/// (their own `status` key, if any, replaces `"error"`); any other non-null payload is nested under
/// `data`. A null payload contributes nothing.
#[must_use]
pub fn normalize_error_payload(data: Value) -> Value {
    let payload = match data.pointer("/response/data") {
        Some(nested) if !nested.is_null() => nested.clone(),
        _ => data,
    };

    let mut out = Map::new();
    out.insert("status".to_string(), Value::String("error".to_string()));
    match payload {
        Value::Object(fields) => out.extend(fields),
        Value::Null => {}
        scalar @ (Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Array(_)) => {
            out.insert("data".to_string(), scalar);
        }
    }
    Value::Object(out)
}
