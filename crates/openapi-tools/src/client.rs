//! HTTP execution of converted `OpenAPI` operations.
//!
//! The client marshals call arguments into path/query/header/body according to the operation's
//! parameter list. It does not validate arguments against the input schema; the backend does.

use crate::convert::{OperationDef, ParamLocation, QuerySerialization, ToolParameter};
use openapiv3::QueryStyle;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Authentication applied to every request of one backend.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    None,
    Bearer { token: String },
    Basic { username: String, password: String },
    Header { name: String, value: String },
    Query { name: String, value: String },
}

/// Settings for one backend's HTTP client.
#[derive(Debug, Clone, Default)]
pub struct HttpClientConfig {
    /// Absolute base URL all operation paths are appended to.
    pub base_url: String,
    pub auth: Option<AuthConfig>,
    /// Static headers sent with every request.
    pub headers: HashMap<String, String>,
    /// Per-request timeout. `None` means no timeout.
    pub timeout: Option<Duration>,
}

/// A successful (2xx) backend response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Body parsed as JSON, or the raw text as a JSON string if it is not JSON.
    pub data: Value,
    pub headers: HeaderMap,
}

#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The backend answered with a non-2xx status.
    #[error("{status} {message}")]
    Status {
        status: u16,
        message: String,
        data: Value,
        headers: HeaderMap,
    },

    /// The request never produced a response (connect, TLS, timeout, body read).
    #[error("request failed: {0}")]
    Transport(String),

    /// The arguments could not be marshalled into a request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, HttpClientError>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryPair {
    key: String,
    value: String,
    allow_reserved: bool,
}

struct RequestParts {
    path: String,
    query_params: Vec<QueryPair>,
    headers: Vec<(String, String)>,
    body_fields: serde_json::Map<String, Value>,
    body_payload: Option<Value>,
}

/// HTTP client bound to one backend. Cheap to clone.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<HttpClientInner>,
}

struct HttpClientInner {
    config: HttpClientConfig,
    client: Client,
}

impl HttpClient {
    /// Build a client for one backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an absolute URL.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        Url::parse(&config.base_url).map_err(|e| {
            HttpClientError::InvalidRequest(format!("Invalid baseUrl '{}': {e}", config.base_url))
        })?;

        Ok(Self {
            inner: Arc::new(HttpClientInner {
                config,
                client: Client::new(),
            }),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.config.base_url
    }

    /// Execute one operation with the given call arguments.
    ///
    /// # Errors
    ///
    /// - [`HttpClientError::Status`] if the backend answers with a non-2xx status
    /// - [`HttpClientError::Transport`] if no response was received
    /// - [`HttpClientError::InvalidRequest`] if the arguments cannot form a request
    pub async fn execute_operation(
        &self,
        operation: &OperationDef,
        arguments: &Value,
    ) -> Result<HttpResponse> {
        let config = &self.inner.config;

        let mut parts = build_request_parts(operation, arguments)?;
        if let Some(AuthConfig::Query { name, value }) = &config.auth {
            parts.query_params.push(QueryPair {
                key: name.clone(),
                value: value.clone(),
                allow_reserved: false,
            });
        }
        let url = build_url(&config.base_url, &parts.path, &parts.query_params)?;

        tracing::debug!(
            method = %operation.method,
            url = %redact_url(&url),
            "executing operation"
        );

        let mut request = self.inner.client.request(operation.method.clone(), url);
        request = match &config.auth {
            Some(AuthConfig::Bearer { token }) => request.bearer_auth(token),
            Some(AuthConfig::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(AuthConfig::Header { name, value }) => request.header(name, value),
            // Query auth is applied during URL building.
            Some(AuthConfig::Query { .. } | AuthConfig::None) | None => request,
        };
        for (key, value) in &config.headers {
            request = request.header(key, value);
        }
        for (key, value) in &parts.headers {
            request = request.header(key, value);
        }
        if let Some(payload) = &parts.body_payload {
            request = request.json(payload);
        } else if !parts.body_fields.is_empty() {
            request = request.json(&parts.body_fields);
        }
        if let Some(timeout) = config.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HttpClientError::Transport(sanitize_reqwest_error(&e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| HttpClientError::Transport(sanitize_reqwest_error(&e)))?;
        let data = parse_body(&text);

        if status.is_success() {
            Ok(HttpResponse {
                status: status.as_u16(),
                data,
                headers,
            })
        } else {
            Err(HttpClientError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
                data,
                headers,
            })
        }
    }
}

/// Parse a response body: JSON when it parses (whatever the content type), otherwise the raw text.
fn parse_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| json!(text))
}

fn build_request_parts(operation: &OperationDef, arguments: &Value) -> Result<RequestParts> {
    let mut path = operation.path.clone();
    let mut query_params: Vec<QueryPair> = Vec::new();
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut body_fields = serde_json::Map::new();
    let mut body_payload: Option<Value> = None;

    for param in &operation.parameters {
        let value = match arguments.get(&param.name) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        };

        match (param.location, value) {
            (ParamLocation::Path, None) => {
                return Err(HttpClientError::InvalidRequest(format!(
                    "Missing path parameter: {}",
                    param.name
                )));
            }
            (ParamLocation::Path, Some(val)) => {
                let encoded = encode_query_component(&value_to_string(val), false);
                path = path.replace(&format!("{{{}}}", param.name), &encoded);
            }
            (ParamLocation::Query, Some(val)) => {
                query_params.extend(serialize_query_param(param, val));
            }
            (ParamLocation::Query, None) => {
                // Required-but-absent values are left for the backend to reject.
            }
            (ParamLocation::Header, Some(val)) => {
                headers.push((param.name.clone(), value_to_string(val)));
            }
            (ParamLocation::Body, Some(val)) => {
                body_fields.insert(param.name.clone(), val.clone());
            }
            (ParamLocation::BodyPayload, Some(val)) => body_payload = Some(val.clone()),
            (ParamLocation::Header | ParamLocation::Body | ParamLocation::BodyPayload, None) => {}
        }
    }

    if !path.starts_with('/') {
        path = format!("/{path}");
    }

    Ok(RequestParts {
        path,
        query_params,
        headers,
        body_fields,
        body_payload,
    })
}

fn build_url(base_url: &str, path: &str, query_params: &[QueryPair]) -> Result<Url> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    let mut url =
        Url::parse(&url).map_err(|e| HttpClientError::InvalidRequest(format!("Invalid URL: {e}")))?;

    if !query_params.is_empty() {
        let query = query_params
            .iter()
            .map(|p| {
                format!(
                    "{}={}",
                    encode_query_component(&p.key, false),
                    encode_query_component(&p.value, p.allow_reserved)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    Ok(url)
}

fn serialize_query_param(param: &ToolParameter, value: &Value) -> Vec<QueryPair> {
    let default_ser = QuerySerialization {
        style: QueryStyle::Form,
        explode: true,
        allow_reserved: false,
        allow_empty_value: false,
    };
    let ser = param.query.as_ref().unwrap_or(&default_ser);
    let name = param.name.as_str();
    let pair = |key: String, value: String| QueryPair {
        key,
        value,
        allow_reserved: ser.allow_reserved,
    };

    if query_value_is_empty(value) {
        if ser.allow_empty_value || param.required {
            return vec![pair(name.to_string(), String::new())];
        }
        return Vec::new();
    }

    match value {
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(value_to_string).collect();
            match ser.style {
                QueryStyle::Form if ser.explode => items
                    .into_iter()
                    .map(|v| pair(name.to_string(), v))
                    .collect(),
                QueryStyle::SpaceDelimited => vec![pair(name.to_string(), items.join(" "))],
                QueryStyle::PipeDelimited => vec![pair(name.to_string(), items.join("|"))],
                QueryStyle::Form | QueryStyle::DeepObject => {
                    vec![pair(name.to_string(), items.join(","))]
                }
            }
        }
        Value::Object(map) => match ser.style {
            QueryStyle::DeepObject => map
                .iter()
                .map(|(k, v)| pair(format!("{name}[{k}]"), value_to_string(v)))
                .collect(),
            QueryStyle::Form if ser.explode => map
                .iter()
                .map(|(k, v)| pair(k.clone(), value_to_string(v)))
                .collect(),
            QueryStyle::Form => {
                let parts: Vec<String> = map
                    .iter()
                    .flat_map(|(k, v)| [k.clone(), value_to_string(v)])
                    .collect();
                vec![pair(name.to_string(), parts.join(","))]
            }
            QueryStyle::SpaceDelimited | QueryStyle::PipeDelimited => {
                vec![pair(name.to_string(), Value::Object(map.clone()).to_string())]
            }
        },
        _ => vec![pair(name.to_string(), value_to_string(value))],
    }
}

fn query_value_is_empty(value: &Value) -> bool {
    match value {
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Null => true,
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Convert a JSON value to a string for URL/header parameters.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

fn encode_query_component(s: &str, allow_reserved: bool) -> String {
    // '&', '=' and '#' stay encoded even with allowReserved, or they would split the query.
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        let keep = is_unreserved(b) || (allow_reserved && is_reserved_but_safe_in_pairs(b));
        if keep {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn is_unreserved(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~')
}

fn is_reserved_but_safe_in_pairs(b: u8) -> bool {
    matches!(
        b,
        b':' | b'/'
            | b'?'
            | b'['
            | b']'
            | b'@'
            | b'!'
            | b'$'
            | b'\''
            | b'('
            | b')'
            | b'*'
            | b'+'
            | b','
            | b';'
    )
}

/// Drop credentials, query and fragment from a URL before it reaches logs or error messages.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::OpenApiConverter;
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::{HeaderMap as AxumHeaders, Method, StatusCode, Uri};
    use axum::routing::any;
    use openapiv3::OpenAPI;
    use tokio::net::TcpListener;

    const SPEC: &str = r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /users/{id}:
    post:
      operationId: updateUser
      parameters:
        - { name: id, in: path, required: true, schema: { type: string } }
        - { name: tags, in: query, schema: { type: array, items: { type: string } } }
        - { name: filter, in: query, style: deepObject, schema: { type: object } }
        - { name: x-trace, in: header, schema: { type: string } }
      requestBody:
        content:
          application/json:
            schema:
              type: object
              properties:
                name: { type: string }
      responses: { "200": { description: ok } }
  /missing:
    get:
      operationId: missing
      responses: { "404": { description: nope } }
"#;

    fn operation(name: &str) -> Arc<OperationDef> {
        let spec: OpenAPI = serde_yaml::from_str(SPEC).expect("spec");
        let tools = OpenApiConverter::new(&spec).convert().expect("convert");
        tools
            .groups
            .iter()
            .flat_map(|g| &g.methods)
            .find(|m| m.name == name)
            .map(|m| Arc::clone(&m.operation))
            .expect("operation")
    }

    async fn echo_handler(
        method: Method,
        uri: Uri,
        headers: AxumHeaders,
        body: Bytes,
    ) -> axum::response::Response {
        use axum::response::IntoResponse as _;
        if uri.path() == "/missing" {
            return (
                StatusCode::NOT_FOUND,
                axum::Json(json!({"message": "no such resource"})),
            )
                .into_response();
        }
        axum::Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "query": uri.query().unwrap_or(""),
            "x_trace": headers.get("x-trace").and_then(|v| v.to_str().ok()),
            "x_static": headers.get("x-static").and_then(|v| v.to_str().ok()),
            "authorization": headers.get("authorization").and_then(|v| v.to_str().ok()),
            "body": String::from_utf8_lossy(&body),
        }))
        .into_response()
    }

    async fn start_echo() -> (String, tokio::sync::oneshot::Sender<()>) {
        let app = Router::new().route("/{*path}", any(echo_handler));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });
        (format!("http://{addr}"), shutdown_tx)
    }

    #[tokio::test]
    async fn execute_operation_marshals_path_query_headers_body_and_auth() {
        let (base_url, shutdown) = start_echo().await;
        let client = HttpClient::new(HttpClientConfig {
            base_url,
            auth: Some(AuthConfig::Bearer {
                token: "secret".to_string(),
            }),
            headers: HashMap::from([("x-static".to_string(), "1".to_string())]),
            timeout: Some(Duration::from_secs(10)),
        })
        .expect("client");

        let resp = client
            .execute_operation(
                &operation("updateUser"),
                &json!({
                    "id": "a b",
                    "tags": ["x", "y"],
                    "filter": {"kind": "cat"},
                    "x-trace": "t-1",
                    "name": "rex",
                }),
            )
            .await
            .expect("execute");

        assert_eq!(resp.status, 200);
        let echoed = resp.data;
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["path"], "/users/a%20b");
        assert_eq!(echoed["query"], "tags=x&tags=y&filter%5Bkind%5D=cat");
        assert_eq!(echoed["x_trace"], "t-1");
        assert_eq!(echoed["x_static"], "1");
        assert_eq!(echoed["authorization"], "Bearer secret");
        assert_eq!(echoed["body"], r#"{"name":"rex"}"#);

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn non_success_status_is_a_typed_failure() {
        let (base_url, shutdown) = start_echo().await;
        let client = HttpClient::new(HttpClientConfig {
            base_url,
            ..HttpClientConfig::default()
        })
        .expect("client");

        let err = client
            .execute_operation(&operation("missing"), &json!({}))
            .await
            .expect_err("404");
        match err {
            HttpClientError::Status {
                status,
                message,
                data,
                headers,
            } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Not Found");
                assert_eq!(data, json!({"message": "no such resource"}));
                assert!(headers.contains_key(reqwest::header::CONTENT_TYPE));
            }
            other => panic!("expected status failure, got {other:?}"),
        }

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn missing_path_parameter_and_unreachable_backend_are_not_status_failures() {
        let client = HttpClient::new(HttpClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..HttpClientConfig::default()
        })
        .expect("client");

        let err = client
            .execute_operation(&operation("updateUser"), &json!({}))
            .await
            .expect_err("missing id");
        assert!(matches!(err, HttpClientError::InvalidRequest(_)));

        let err = client
            .execute_operation(&operation("missing"), &json!({}))
            .await
            .expect_err("connection refused");
        assert!(matches!(err, HttpClientError::Transport(_)));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(HttpClient::new(HttpClientConfig::default()).is_err());
    }

    #[test]
    fn parse_body_falls_back_to_text() {
        assert_eq!(parse_body(r#"{"id":1}"#), json!({"id": 1}));
        assert_eq!(parse_body("plain"), json!("plain"));
        assert_eq!(parse_body(""), json!(""));
    }

    #[test]
    fn query_serialization_respects_style_and_explode() {
        let param = |style: QueryStyle, explode: bool| ToolParameter {
            name: "ids".to_string(),
            location: ParamLocation::Query,
            required: false,
            schema: json!({"type": "array"}),
            query: Some(QuerySerialization {
                style,
                explode,
                allow_reserved: false,
                allow_empty_value: false,
            }),
        };
        let values = json!(["1", "2"]);

        let joined = |pairs: Vec<QueryPair>| {
            pairs
                .into_iter()
                .map(|p| format!("{}={}", p.key, p.value))
                .collect::<Vec<_>>()
                .join("&")
        };

        assert_eq!(
            joined(serialize_query_param(&param(QueryStyle::Form, true), &values)),
            "ids=1&ids=2"
        );
        assert_eq!(
            joined(serialize_query_param(&param(QueryStyle::Form, false), &values)),
            "ids=1,2"
        );
        assert_eq!(
            joined(serialize_query_param(&param(QueryStyle::PipeDelimited, false), &values)),
            "ids=1|2"
        );
        assert!(serialize_query_param(&param(QueryStyle::Form, true), &json!([])).is_empty());
    }
}
