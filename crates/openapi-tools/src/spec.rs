//! `OpenAPI` spec acquisition.
//!
//! Sources are fetched independently: one unreachable or malformed source never prevents the
//! others from loading. Callers get one `Result` per source, in source order.

use crate::error::{OpenApiToolsError, Result};
use futures::future::join_all;
use openapiv3::OpenAPI;
use reqwest::Client;
use url::Url;

/// A successfully fetched and parsed document.
#[derive(Debug, Clone)]
pub struct AcquiredSpec {
    /// Where the document came from (URL or file path).
    pub location: String,
    pub document: OpenAPI,
}

/// Fetch every source concurrently.
///
/// The output has exactly one entry per input source, in the same order.
pub async fn acquire_all<S>(client: &Client, sources: &[S]) -> Vec<Result<AcquiredSpec>>
where
    S: AsRef<str>,
{
    join_all(sources.iter().map(|location| async move {
        let location = location.as_ref();
        fetch_spec(client, location)
            .await
            .map(|document| AcquiredSpec {
                location: location.to_string(),
                document,
            })
    }))
    .await
}

/// Fetch and parse one spec from a URL or a local file.
///
/// # Errors
///
/// Returns an error if the spec cannot be fetched (transport failure or non-2xx status), read,
/// or parsed as an `OpenAPI` v3 document.
pub async fn fetch_spec(client: &Client, location: &str) -> Result<OpenAPI> {
    let content = if is_http_url(location) {
        tracing::info!(spec = %location, "fetching OpenAPI spec");
        let url = Url::parse(location).map_err(|e| {
            OpenApiToolsError::OpenApi(format!("Invalid OpenAPI spec URL '{location}': {e}"))
        })?;

        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| OpenApiToolsError::OpenApiSpecFetch {
                url: location.to_string(),
                message: crate::client::sanitize_reqwest_error(&e),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(OpenApiToolsError::OpenApiSpecStatus {
                url: location.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text()
            .await
            .map_err(|e| OpenApiToolsError::OpenApiSpecReadBody {
                url: location.to_string(),
                message: crate::client::sanitize_reqwest_error(&e),
            })?
    } else {
        tracing::info!(spec = %location, "loading OpenAPI spec from file");
        tokio::fs::read_to_string(location).await.map_err(|e| {
            OpenApiToolsError::OpenApiSpecReadFile {
                path: location.to_string(),
                source: e,
            }
        })?
    };

    // JSON is a valid subset of YAML, so serde_yaml alone is enough.
    serde_yaml::from_str(&content).map_err(|e| OpenApiToolsError::OpenApiSpecParse {
        location: location.to_string(),
        source: e,
    })
}

/// Determine the base URL for a backend: explicit override first, then `servers[0].url`.
///
/// Relative server URLs (e.g. `/api/v3`) are resolved against the spec URL when the spec itself
/// was fetched over HTTP.
///
/// # Errors
///
/// Returns an error if no base URL is available or it cannot be made absolute.
pub fn resolve_base_url(
    location: &str,
    document: &OpenAPI,
    override_url: Option<&str>,
) -> Result<String> {
    let base_url = override_url
        .map(str::to_string)
        .or_else(|| document.servers.first().map(|s| s.url.clone()))
        .ok_or_else(|| OpenApiToolsError::MissingServer {
            location: location.to_string(),
        })?;

    if is_http_url(&base_url) {
        return Ok(base_url);
    }

    if is_http_url(location) {
        let mut spec_url = Url::parse(location).map_err(|e| {
            OpenApiToolsError::OpenApi(format!("Invalid OpenAPI spec URL '{location}': {e}"))
        })?;
        spec_url.set_fragment(None);

        let resolved = spec_url.join(&base_url).map_err(|e| {
            OpenApiToolsError::OpenApi(format!(
                "Invalid baseUrl '{base_url}': {e} (set baseUrl explicitly)"
            ))
        })?;
        return Ok(resolved.to_string());
    }

    Err(OpenApiToolsError::OpenApi(format!(
        "Invalid baseUrl '{base_url}': must be an absolute http(s) URL (set baseUrl explicitly)",
    )))
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}
