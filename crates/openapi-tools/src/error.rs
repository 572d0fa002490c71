//! Error types for `apibridge-openapi-tools`.

use thiserror::Error;

/// Error type for spec acquisition and tool conversion.
///
/// Request execution has its own error type ([`crate::client::HttpClientError`]) because the
/// dispatcher needs to tell HTTP status failures apart from everything else.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// `OpenAPI` errors (spec structure, `$ref` resolution).
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    #[error("OpenAPI error: failed to fetch spec from '{url}': {message}")]
    OpenApiSpecFetch { url: String, message: String },

    #[error("OpenAPI error: HTTP error! status: {status} (fetching '{url}')")]
    OpenApiSpecStatus { url: String, status: u16 },

    #[error("OpenAPI error: failed to read spec body from '{url}': {message}")]
    OpenApiSpecReadBody { url: String, message: String },

    #[error("OpenAPI error: failed to read spec file '{path}': {source}")]
    OpenApiSpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OpenAPI error: failed to parse OpenAPI spec from '{location}': {source}")]
    OpenApiSpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The spec declares no usable server and no base URL override was given.
    #[error("OpenAPI error: spec '{location}' declares no servers[0].url")]
    MissingServer { location: String },

    /// Parameter collision errors.
    #[error("Parameter collision: {0}")]
    ParamCollision(String),

    /// JSON errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
