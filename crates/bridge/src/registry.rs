//! Tool registry.
//!
//! Merges the converted operations of every backend into one flat tool namespace. The registry is
//! built once at startup and never mutated afterwards, so request handlers share it by reference
//! without locking.

use crate::binding::Backend;
use crate::config::CollisionPolicy;
use crate::discovery::{DISCOVERY_TOOL_NAME, discovery_tool};
use crate::error::{BridgeError, Result};
use apibridge_openapi_tools::convert::{OpenApiConverter, OperationDef};
use rmcp::model::{JsonObject, Tool};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum length (in characters) of a published tool name.
pub const MAX_TOOL_NAME_LEN: usize = 64;

const HASH_SUFFIX_LEN: usize = 8;

/// One converted operation, with its real input schema.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Published (truncated, possibly disambiguated) tool name.
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    /// `<spec location> <group>-<method>`, for diagnostics.
    pub origin: String,
}

/// Where an invocation of a tool goes.
#[derive(Debug, Clone)]
pub struct DispatchEntry {
    pub operation: Arc<OperationDef>,
    pub backend: Arc<Backend>,
}

#[derive(Debug)]
pub struct ToolRegistry {
    /// Every operation in build order: backends, then groups, then methods.
    catalog: Vec<CatalogEntry>,
    dispatch: HashMap<String, DispatchEntry>,
    /// Precomputed `tools/list` payload: the discovery tool, then one opaque entry per operation.
    listing: Vec<Tool>,
}

impl ToolRegistry {
    /// Registry with no backends: only the discovery tool is listed.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            catalog: Vec::new(),
            dispatch: HashMap::new(),
            listing: vec![discovery_tool()],
        }
    }

    /// Convert every backend's document and merge the results.
    ///
    /// A document that cannot be converted is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Startup`] if two operations map to the same tool name under
    /// [`CollisionPolicy::Fail`].
    pub fn build(backends: Vec<Backend>, policy: CollisionPolicy) -> Result<Self> {
        let mut catalog: Vec<CatalogEntry> = Vec::new();
        let mut dispatch: HashMap<String, DispatchEntry> = HashMap::new();
        // First origin registered under each name.
        let mut origins: HashMap<String, String> = HashMap::new();
        origins.insert(DISCOVERY_TOOL_NAME.to_string(), "built-in".to_string());

        for backend in backends {
            let backend = Arc::new(backend);
            let converted = match OpenApiConverter::new(&backend.document).convert() {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(
                        spec = %backend.location,
                        error = %e,
                        "failed to convert OpenAPI document; skipping"
                    );
                    continue;
                }
            };

            for group in &converted.groups {
                for method in &group.methods {
                    let derived = format!("{}-{}", group.name, method.name);
                    let Some(operation) = converted.lookup(&derived) else {
                        tracing::warn!(spec = %backend.location, tool = %derived, "operation lookup failed; skipping");
                        continue;
                    };
                    let origin = format!("{} {derived}", backend.location);

                    let mut name = truncate_name(&derived);
                    if let Some(existing) = origins.get(&name) {
                        match policy {
                            CollisionPolicy::Disambiguate => {
                                let renamed = disambiguated_name(&name, &origin, &origins);
                                tracing::warn!(
                                    tool = %name,
                                    existing = %existing,
                                    origin = %origin,
                                    renamed = %renamed,
                                    "tool name collision; renaming"
                                );
                                name = renamed;
                            }
                            CollisionPolicy::Overwrite => {
                                tracing::warn!(
                                    tool = %name,
                                    existing = %existing,
                                    origin = %origin,
                                    "tool name collision; later operation handles invocations"
                                );
                            }
                            CollisionPolicy::Fail => {
                                return Err(BridgeError::Startup(format!(
                                    "tool name '{name}' is produced by both {existing} and {origin}"
                                )));
                            }
                        }
                    }

                    origins.entry(name.clone()).or_insert_with(|| origin.clone());
                    dispatch.insert(
                        name.clone(),
                        DispatchEntry {
                            operation: Arc::clone(operation),
                            backend: Arc::clone(&backend),
                        },
                    );
                    catalog.push(CatalogEntry {
                        name,
                        description: trim_description(&method.description),
                        input_schema: method.input_schema.clone(),
                        origin,
                    });
                }
            }
        }

        let listing = std::iter::once(discovery_tool())
            .chain(catalog.iter().map(|entry| {
                Tool::new(
                    entry.name.clone(),
                    entry.description.clone(),
                    Arc::new(opaque_schema()),
                )
            }))
            .collect();

        tracing::info!(
            tools = catalog.len(),
            routes = dispatch.len(),
            policy = ?policy,
            "tool registry built"
        );

        Ok(Self {
            catalog,
            dispatch,
            listing,
        })
    }

    /// The `tools/list` payload. Always starts with the discovery tool.
    #[must_use]
    pub fn list_tools(&self) -> &[Tool] {
        &self.listing
    }

    /// Find where an invocation of `name` should go.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&DispatchEntry> {
        self.dispatch.get(name)
    }

    /// The real input schema of the first catalog entry named `name`.
    #[must_use]
    pub fn find_input_schema(&self, name: &str) -> Option<&Value> {
        self.catalog
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.input_schema)
    }

    #[must_use]
    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }
}

/// Schema published for every derived tool; the real one comes from the discovery tool.
fn opaque_schema() -> JsonObject {
    match json!({"type": "object", "properties": {}}) {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_TOOL_NAME_LEN).collect()
}

/// Keep only the text before the first literal `Error`, trimmed.
fn trim_description(description: &str) -> String {
    description
        .split("Error")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// `<prefix>-<8 hex chars of sha256(origin)>`, kept within the name length limit.
fn disambiguated_name(name: &str, origin: &str, taken: &HashMap<String, String>) -> String {
    let prefix: String = name
        .chars()
        .take(MAX_TOOL_NAME_LEN - HASH_SUFFIX_LEN - 1)
        .collect();

    let mut attempt = 0u32;
    loop {
        let seed = if attempt == 0 {
            origin.to_string()
        } else {
            format!("{origin}#{attempt}")
        };
        let hash = hex::encode(Sha256::digest(seed.as_bytes()));
        let candidate = format!("{prefix}-{}", &hash[..HASH_SUFFIX_LEN]);
        if !taken.contains_key(&candidate) {
            return candidate;
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apibridge_openapi_tools::client::{HttpClient, HttpClientConfig};
    use openapiv3::OpenAPI;

    const PETS: &str = r#"
openapi: "3.0.0"
info: { title: pets, version: "1" }
servers: [{ url: "http://127.0.0.1:9" }]
paths:
  /pets:
    get:
      tags: [pets]
      operationId: listPets
      summary: List all pets. Errors are reported as JSON
      parameters:
        - { name: limit, in: query, schema: { type: integer } }
      responses:
        "200": { description: ok }
        "500": { description: boom }
  /pets/{petId}:
    get:
      tags: [pets]
      operationId: showPetById
      parameters:
        - { name: petId, in: path, required: true, schema: { type: string } }
      responses: { "200": { description: ok } }
  /stores:
    get:
      operationId: listStores
      description: "  Stores  "
      responses: { "200": { description: ok } }
"#;

    fn backend(location: &str, yaml: &str) -> Backend {
        let document: OpenAPI = serde_yaml::from_str(yaml).expect("spec");
        let client = HttpClient::new(HttpClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..HttpClientConfig::default()
        })
        .expect("client");
        Backend {
            location: location.to_string(),
            document,
            client,
        }
    }

    fn names(registry: &ToolRegistry) -> Vec<String> {
        registry
            .list_tools()
            .iter()
            .map(|t| t.name.to_string())
            .collect()
    }

    #[test]
    fn empty_registry_lists_only_the_discovery_tool() {
        let registry = ToolRegistry::build(Vec::new(), CollisionPolicy::default()).unwrap();
        assert_eq!(names(&registry), vec![DISCOVERY_TOOL_NAME]);
        assert_eq!(names(&ToolRegistry::empty()), vec![DISCOVERY_TOOL_NAME]);
    }

    #[test]
    fn lists_discovery_first_then_operations_in_build_order() {
        let registry = ToolRegistry::build(
            vec![backend("pets.yaml", PETS)],
            CollisionPolicy::default(),
        )
        .unwrap();

        assert_eq!(
            names(&registry),
            vec![
                DISCOVERY_TOOL_NAME,
                "pets-listPets",
                "pets-showPetById",
                "stores-listStores"
            ]
        );

        let tools = registry.list_tools();
        assert_eq!(
            tools[1].description.as_deref(),
            Some("List all pets.")
        );
        assert_eq!(tools[3].description.as_deref(), Some("Stores"));
        for tool in &tools[1..] {
            assert_eq!(
                Value::Object((*tool.input_schema).clone()),
                json!({"type": "object", "properties": {}})
            );
        }
    }

    #[test]
    fn listing_is_idempotent() {
        let registry = ToolRegistry::build(
            vec![backend("pets.yaml", PETS)],
            CollisionPolicy::default(),
        )
        .unwrap();
        let first = serde_json::to_value(registry.list_tools()).unwrap();
        let second = serde_json::to_value(registry.list_tools()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn discovery_schema_matches_converted_method() {
        let doc: OpenAPI = serde_yaml::from_str(PETS).unwrap();
        let converted = OpenApiConverter::new(&doc).convert().unwrap();
        let registry = ToolRegistry::build(
            vec![backend("pets.yaml", PETS)],
            CollisionPolicy::default(),
        )
        .unwrap();

        for group in &converted.groups {
            for method in &group.methods {
                let name = format!("{}-{}", group.name, method.name);
                assert_eq!(registry.find_input_schema(&name), Some(&method.input_schema));
                assert!(registry.resolve(&name).is_some());
            }
        }
        assert!(registry.find_input_schema("pets-nope").is_none());
    }

    #[test]
    fn long_names_are_truncated_to_64_chars() {
        let long_tag = "a".repeat(50);
        let yaml = format!(
            r#"
openapi: "3.0.0"
info: {{ title: t, version: "1" }}
paths:
  /x:
    get:
      tags: [{long_tag}]
      operationId: {op}
      responses: {{ "200": {{ description: ok }} }}
"#,
            op = "b".repeat(30)
        );
        let registry =
            ToolRegistry::build(vec![backend("x.yaml", &yaml)], CollisionPolicy::default())
                .unwrap();

        let expected: String = format!("{long_tag}-{}", "b".repeat(30))
            .chars()
            .take(MAX_TOOL_NAME_LEN)
            .collect();
        assert_eq!(names(&registry)[1], expected);
        assert_eq!(expected.chars().count(), MAX_TOOL_NAME_LEN);
        assert!(registry.resolve(&expected).is_some());
    }

    fn long_named_backend(location: &str, op: &str) -> Backend {
        let yaml = format!(
            r#"
openapi: "3.0.0"
info: {{ title: t, version: "1" }}
paths:
  /x:
    get:
      tags: [{tag}]
      operationId: {op}
      responses: {{ "200": {{ description: ok }} }}
"#,
            tag = "a".repeat(50)
        );
        backend(location, &yaml)
    }

    #[test]
    fn names_equal_only_after_truncation_collide() {
        let first_op = format!("{}first1", "b".repeat(15));
        let second_op = format!("{}second", "b".repeat(15));
        let truncated = truncate_name(&format!("{}-{first_op}", "a".repeat(50)));
        assert_eq!(
            truncated,
            truncate_name(&format!("{}-{second_op}", "a".repeat(50)))
        );

        let overwritten = ToolRegistry::build(
            vec![
                long_named_backend("first.yaml", &first_op),
                long_named_backend("second.yaml", &second_op),
            ],
            CollisionPolicy::Overwrite,
        )
        .unwrap();
        assert_eq!(
            names(&overwritten),
            vec![DISCOVERY_TOOL_NAME, truncated.as_str(), truncated.as_str()]
        );
        assert_eq!(
            overwritten.resolve(&truncated).unwrap().backend.location,
            "second.yaml"
        );

        let renamed = ToolRegistry::build(
            vec![
                long_named_backend("first.yaml", &first_op),
                long_named_backend("second.yaml", &second_op),
            ],
            CollisionPolicy::Disambiguate,
        )
        .unwrap();
        let listed = names(&renamed);
        assert_eq!(listed[1], truncated);
        let prefix: String = truncated
            .chars()
            .take(MAX_TOOL_NAME_LEN - HASH_SUFFIX_LEN - 1)
            .collect();
        let suffix = listed[2]
            .strip_prefix(&format!("{prefix}-"))
            .expect("renamed tool keeps the truncated prefix");
        assert_eq!(suffix.len(), HASH_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(listed[2].chars().count(), MAX_TOOL_NAME_LEN);
        assert_eq!(
            renamed.resolve(&truncated).unwrap().backend.location,
            "first.yaml"
        );
        assert_eq!(
            renamed.resolve(&listed[2]).unwrap().backend.location,
            "second.yaml"
        );
    }

    #[test]
    fn overwrite_policy_routes_to_the_later_operation() {
        let registry = ToolRegistry::build(
            vec![backend("first.yaml", PETS), backend("second.yaml", PETS)],
            CollisionPolicy::Overwrite,
        )
        .unwrap();

        let listed = names(&registry);
        assert_eq!(listed.len(), 7);
        assert_eq!(
            listed.iter().filter(|n| *n == "pets-listPets").count(),
            2
        );
        let entry = registry.resolve("pets-listPets").unwrap();
        assert_eq!(entry.backend.location, "second.yaml");
        assert_eq!(registry.catalog()[0].origin, "first.yaml pets-listPets");
    }

    #[test]
    fn disambiguate_policy_keeps_both_operations_invokable() {
        let registry = ToolRegistry::build(
            vec![backend("first.yaml", PETS), backend("second.yaml", PETS)],
            CollisionPolicy::Disambiguate,
        )
        .unwrap();

        let listed = names(&registry);
        assert_eq!(listed.len(), 7);
        let renamed = &listed[4];
        assert!(renamed.starts_with("pets-listPets-"));
        assert_eq!(renamed.len(), "pets-listPets-".len() + HASH_SUFFIX_LEN);
        assert!(listed.iter().all(|n| n.chars().count() <= MAX_TOOL_NAME_LEN));

        assert_eq!(
            registry.resolve("pets-listPets").unwrap().backend.location,
            "first.yaml"
        );
        assert_eq!(
            registry.resolve(renamed).unwrap().backend.location,
            "second.yaml"
        );
    }

    #[test]
    fn fail_policy_reports_both_origins() {
        let err = ToolRegistry::build(
            vec![backend("first.yaml", PETS), backend("second.yaml", PETS)],
            CollisionPolicy::Fail,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("first.yaml pets-listPets"), "{msg}");
        assert!(msg.contains("second.yaml pets-listPets"), "{msg}");
    }

    #[test]
    fn disambiguated_names_fit_the_limit() {
        let long = "n".repeat(MAX_TOOL_NAME_LEN);
        let renamed = disambiguated_name(&long, "origin", &HashMap::new());
        assert_eq!(renamed.chars().count(), MAX_TOOL_NAME_LEN);

        let mut taken = HashMap::new();
        taken.insert(renamed.clone(), String::new());
        assert_ne!(disambiguated_name(&long, "origin", &taken), renamed);
    }
}
