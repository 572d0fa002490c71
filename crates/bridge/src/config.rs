//! Bridge configuration.
//!
//! A YAML file (camelCase keys) lists the `OpenAPI` sources to expose. Without a file the bridge
//! serves the two RSS3 APIs.

use crate::error::{BridgeError, Result};
use apibridge_openapi_tools::client::{AuthConfig, HttpClientConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_NAME: &str = "rss3";
pub const DEFAULT_VERSION: &str = "0.1.0";
pub const DEFAULT_SPEC_URLS: [&str; 2] = [
    "https://gi.rss3.io/docs/openapi.json",
    "https://ai.rss3.io/openapi.json",
];

/// What to do when two operations map to the same tool name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Rename the later tool with a short content-derived suffix.
    #[default]
    Disambiguate,
    /// Keep both listings; invocations go to the later tool.
    Overwrite,
    /// Refuse to start.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BridgeConfig {
    /// Server name reported by `initialize`.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

/// One `OpenAPI` document and how to reach the API it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SourceConfig {
    /// URL or local file path of the document.
    pub spec: String,
    /// Overrides the document's `servers[0].url`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_sources() -> Vec<SourceConfig> {
    DEFAULT_SPEC_URLS.iter().map(|s| SourceConfig::from_spec(*s)).collect()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            collision_policy: CollisionPolicy::default(),
            sources: default_sources(),
        }
    }
}

impl SourceConfig {
    #[must_use]
    pub fn from_spec(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            base_url: None,
            auth: None,
            headers: HashMap::new(),
            timeout_secs: None,
        }
    }

    /// HTTP client settings for this source, given its resolved base URL.
    #[must_use]
    pub fn client_config(&self, base_url: String) -> HttpClientConfig {
        HttpClientConfig {
            base_url,
            auth: self.auth.clone(),
            headers: self.headers.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

impl BridgeConfig {
    /// Apply command-line overrides. `--spec` replaces the configured sources entirely.
    pub fn apply_overrides(&mut self, specs: &[String], policy: Option<CollisionPolicy>) {
        if !specs.is_empty() {
            self.sources = specs.iter().map(SourceConfig::from_spec).collect();
        }
        if let Some(policy) = policy {
            self.collision_policy = policy;
        }
    }

    /// # Errors
    ///
    /// Returns an error if a source has an empty `spec` or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        for (i, source) in self.sources.iter().enumerate() {
            if source.spec.trim().is_empty() {
                return Err(BridgeError::Config(format!("sources[{i}].spec is empty")));
            }
            if source.timeout_secs == Some(0) {
                return Err(BridgeError::Config(format!(
                    "sources[{i}].timeoutSecs must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}

/// Load the configuration file, or the defaults when no path is given.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or fails validation.
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let Some(path) = path else {
        return Ok(BridgeConfig::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        BridgeError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let config: BridgeConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
