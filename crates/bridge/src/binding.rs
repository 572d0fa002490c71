//! Backend binding: pair each acquired document with an HTTP client for its API.

use crate::config::SourceConfig;
use apibridge_openapi_tools::client::HttpClient;
use apibridge_openapi_tools::error::Result as AcquireResult;
use apibridge_openapi_tools::spec::{AcquiredSpec, acquire_all, resolve_base_url};
use openapiv3::OpenAPI;

/// One reachable API: its document and a client bound to its base URL.
pub struct Backend {
    /// Where the document came from.
    pub location: String,
    pub document: OpenAPI,
    pub client: HttpClient,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("location", &self.location)
            .field("base_url", &self.client.base_url())
            .finish_non_exhaustive()
    }
}

/// Fetch every configured source and bind the ones that succeed.
pub async fn acquire_backends(sources: &[SourceConfig]) -> Vec<Backend> {
    let http = reqwest::Client::new();
    let locations: Vec<&str> = sources.iter().map(|s| s.spec.as_str()).collect();
    let results = acquire_all(&http, &locations).await;
    bind_backends(sources, results)
}

/// Turn acquisition results into backends, logging (not raising) every failure.
///
/// `results` must be in the same order as `sources`.
#[must_use]
pub fn bind_backends(
    sources: &[SourceConfig],
    results: Vec<AcquireResult<AcquiredSpec>>,
) -> Vec<Backend> {
    let mut backends = Vec::new();
    let mut failures: Vec<(String, String)> = Vec::new();

    for (source, result) in sources.iter().zip(results) {
        let acquired = match result {
            Ok(acquired) => acquired,
            Err(e) => {
                failures.push((source.spec.clone(), e.to_string()));
                continue;
            }
        };

        let client = resolve_base_url(
            &acquired.location,
            &acquired.document,
            source.base_url.as_deref(),
        )
        .map_err(|e| e.to_string())
        .and_then(|base_url| {
            HttpClient::new(source.client_config(base_url)).map_err(|e| e.to_string())
        });

        match client {
            Ok(client) => {
                tracing::debug!(
                    spec = %acquired.location,
                    base_url = %client.base_url(),
                    "bound backend"
                );
                backends.push(Backend {
                    location: acquired.location,
                    document: acquired.document,
                    client,
                });
            }
            Err(reason) => failures.push((acquired.location, reason)),
        }
    }

    for (spec, reason) in &failures {
        tracing::warn!(spec = %spec, error = %reason, "failed to load OpenAPI source; skipping");
    }
    tracing::info!(
        backends = backends.len(),
        failed = failures.len(),
        "OpenAPI sources loaded"
    );

    backends
}

#[cfg(test)]
mod tests {
    use super::*;
    use apibridge_openapi_tools::error::OpenApiToolsError;

    fn acquired(location: &str, servers: &str) -> AcquiredSpec {
        let document = serde_json::from_str(&format!(
            r#"{{"openapi":"3.0.0","info":{{"title":"t","version":"1"}},"servers":{servers},"paths":{{}}}}"#
        ))
        .expect("spec");
        AcquiredSpec {
            location: location.to_string(),
            document,
        }
    }

    #[test]
    fn failures_are_skipped_and_successes_keep_order() {
        let sources = vec![
            SourceConfig::from_spec("https://a.example/openapi.json"),
            SourceConfig::from_spec("https://down.example/openapi.json"),
            SourceConfig::from_spec("https://noserver.example/openapi.json"),
            SourceConfig {
                base_url: Some("https://override.example/v2".to_string()),
                ..SourceConfig::from_spec("https://c.example/openapi.json")
            },
        ];
        let results = vec![
            Ok(acquired(
                "https://a.example/openapi.json",
                r#"[{"url":"https://api.a.example"}]"#,
            )),
            Err(OpenApiToolsError::OpenApiSpecStatus {
                url: "https://down.example/openapi.json".to_string(),
                status: 503,
            }),
            Ok(acquired("https://noserver.example/openapi.json", "[]")),
            Ok(acquired(
                "https://c.example/openapi.json",
                r#"[{"url":"https://api.c.example"}]"#,
            )),
        ];

        let backends = bind_backends(&sources, results);
        let bound: Vec<(&str, &str)> = backends
            .iter()
            .map(|b| (b.location.as_str(), b.client.base_url()))
            .collect();
        assert_eq!(
            bound,
            vec![
                ("https://a.example/openapi.json", "https://api.a.example"),
                ("https://c.example/openapi.json", "https://override.example/v2"),
            ]
        );
    }

    #[test]
    fn no_successes_yields_no_backends() {
        let sources = vec![SourceConfig::from_spec("missing.json")];
        let results = vec![Err(OpenApiToolsError::OpenApi("boom".to_string()))];
        assert!(bind_backends(&sources, results).is_empty());
    }
}
