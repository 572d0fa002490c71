//! `OpenAPI` → tool conversion.
//!
//! Every HTTP operation in a document becomes one [`Method`] inside an [`OperationGroup`]. Groups
//! are keyed by the operation's first tag (or its first literal path segment), so one document
//! usually yields one group per API resource. Names are only unique within a single document;
//! merging several documents into one namespace is the registry's job.

use crate::error::{OpenApiToolsError, Result};
use crate::resolver::LocalResolver;
use openapiv3::{
    OpenAPI, Operation, Parameter, ParameterSchemaOrContent, QueryStyle, ReferenceOr, RequestBody,
    Schema, SchemaKind, StatusCode, Type,
};
use regex::Regex;
use reqwest::Method as HttpMethod;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

/// Group name used when an operation has neither a tag nor a literal path segment.
pub const DEFAULT_GROUP: &str = "API";

static PATH_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("valid path param regex"));
static NON_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]+").expect("valid identifier regex"));
static REPEATED_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("valid underscore regex"));

/// Output of converting one `OpenAPI` document.
#[derive(Debug, Clone, Default)]
pub struct ConvertedTools {
    /// Operation groups in first-seen document order.
    pub groups: Vec<OperationGroup>,
}

/// A named set of methods derived from one API resource.
#[derive(Debug, Clone)]
pub struct OperationGroup {
    pub name: String,
    pub methods: Vec<Method>,
}

/// One HTTP operation, ready to be published as a tool.
#[derive(Debug, Clone)]
pub struct Method {
    /// Unique within its group.
    pub name: String,
    /// Human-readable description, including an `Error Responses:` section when the operation
    /// declares error responses.
    pub description: String,
    /// JSON Schema (object) describing the call arguments.
    pub input_schema: Value,
    /// What the HTTP client needs to execute the call.
    pub operation: Arc<OperationDef>,
}

/// Executable description of an `OpenAPI` operation.
#[derive(Debug, Clone)]
pub struct OperationDef {
    pub method: HttpMethod,
    /// Path template (e.g. `/pet/{petId}`).
    pub path: String,
    pub operation_id: Option<String>,
    pub parameters: Vec<ToolParameter>,
}

/// A call argument and where it goes in the HTTP request.
#[derive(Debug, Clone)]
pub struct ToolParameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: Value,
    /// Query serialization settings, for query parameters only.
    pub query: Option<QuerySerialization>,
}

#[derive(Debug, Clone)]
pub struct QuerySerialization {
    pub style: QueryStyle,
    pub explode: bool,
    pub allow_reserved: bool,
    pub allow_empty_value: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    /// One property of a flattened JSON object body.
    Body,
    /// The whole JSON body, passed as the `body` argument.
    BodyPayload,
}

impl ConvertedTools {
    /// Look up an operation by its derived `{group}-{method}` name.
    #[must_use]
    pub fn lookup(&self, derived_name: &str) -> Option<&Arc<OperationDef>> {
        self.groups.iter().find_map(|group| {
            let rest = derived_name
                .strip_prefix(group.name.as_str())?
                .strip_prefix('-')?;
            group
                .methods
                .iter()
                .find(|m| m.name == rest)
                .map(|m| &m.operation)
        })
    }

    #[must_use]
    pub fn method_count(&self) -> usize {
        self.groups.iter().map(|g| g.methods.len()).sum()
    }
}

/// Converts one parsed `OpenAPI` document into operation groups.
pub struct OpenApiConverter<'a> {
    spec: &'a OpenAPI,
}

struct GroupBuilder {
    group: OperationGroup,
    method_names: HashSet<String>,
}

impl<'a> OpenApiConverter<'a> {
    #[must_use]
    pub fn new(spec: &'a OpenAPI) -> Self {
        Self { spec }
    }

    /// Convert every operation in the document.
    ///
    /// Operations that cannot be converted (unresolvable refs, colliding parameter names) are
    /// skipped with a warning rather than failing the whole document.
    ///
    /// # Errors
    ///
    /// Returns an error only if the document itself cannot be prepared for `$ref` resolution.
    pub fn convert(&self) -> Result<ConvertedTools> {
        let resolver = LocalResolver::new(self.spec)?;
        let mut builders: Vec<GroupBuilder> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (path, item_ref) in &self.spec.paths.paths {
            let path_item = match resolver.resolve_path_item(item_ref) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "skipping path");
                    continue;
                }
            };

            let methods = [
                ("get", &path_item.get),
                ("put", &path_item.put),
                ("post", &path_item.post),
                ("delete", &path_item.delete),
                ("options", &path_item.options),
                ("head", &path_item.head),
                ("patch", &path_item.patch),
                ("trace", &path_item.trace),
            ];

            for (method, operation) in methods {
                let Some(operation) = operation.as_ref() else {
                    continue;
                };

                let parameters =
                    match collect_parameters(&resolver, &path_item.parameters, operation, method, path)
                    {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!(
                                method = %method.to_uppercase(),
                                path = %path,
                                error = %e,
                                "skipping operation"
                            );
                            continue;
                        }
                    };

                let group_name = group_name(operation, path);
                let slot = *index.entry(group_name.clone()).or_insert_with(|| {
                    builders.push(GroupBuilder {
                        group: OperationGroup {
                            name: group_name.clone(),
                            methods: Vec::new(),
                        },
                        method_names: HashSet::new(),
                    });
                    builders.len() - 1
                });
                let builder = &mut builders[slot];

                let base_name = operation
                    .operation_id
                    .as_deref()
                    .map(sanitize_identifier)
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| generate_canonical_name(method, path));
                let name = reserve_unique_name(&mut builder.method_names, &base_name);

                builder.group.methods.push(Method {
                    name,
                    description: method_description(&resolver, operation, method, path),
                    input_schema: build_input_schema(&parameters),
                    operation: Arc::new(OperationDef {
                        method: http_method(method),
                        path: path.clone(),
                        operation_id: operation.operation_id.clone(),
                        parameters,
                    }),
                });
            }
        }

        Ok(ConvertedTools {
            groups: builders.into_iter().map(|b| b.group).collect(),
        })
    }
}

fn http_method(method: &str) -> HttpMethod {
    match method {
        "get" => HttpMethod::GET,
        "put" => HttpMethod::PUT,
        "post" => HttpMethod::POST,
        "delete" => HttpMethod::DELETE,
        "options" => HttpMethod::OPTIONS,
        "head" => HttpMethod::HEAD,
        "patch" => HttpMethod::PATCH,
        _ => HttpMethod::TRACE,
    }
}

fn group_name(operation: &Operation, path: &str) -> String {
    let raw = operation
        .tags
        .first()
        .map(String::as_str)
        .or_else(|| {
            path.split('/')
                .find(|seg| !seg.is_empty() && !seg.starts_with('{'))
        })
        .unwrap_or(DEFAULT_GROUP);

    let name = sanitize_identifier(raw);
    if name.is_empty() {
        DEFAULT_GROUP.to_string()
    } else {
        name
    }
}

fn sanitize_identifier(raw: &str) -> String {
    let name = NON_IDENT.replace_all(raw, "_");
    let name = REPEATED_UNDERSCORE.replace_all(&name, "_");
    name.trim_matches('_').to_string()
}

/// Generate a canonical method name from HTTP method and path.
fn generate_canonical_name(method: &str, path: &str) -> String {
    let name = format!("{}_{}", method.to_lowercase(), path.trim_start_matches('/'));
    let name = PATH_PARAM.replace_all(&name, "_$1");
    sanitize_identifier(&name)
}

fn reserve_unique_name(names: &mut HashSet<String>, base: &str) -> String {
    if names.insert(base.to_string()) {
        return base.to_string();
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if names.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn method_description(
    resolver: &LocalResolver,
    operation: &Operation,
    method: &str,
    path: &str,
) -> String {
    let mut description = operation
        .summary
        .clone()
        .or_else(|| operation.description.clone())
        .unwrap_or_else(|| format!("Calls {} {}", method.to_uppercase(), path));

    let mut errors: Vec<String> = operation
        .responses
        .responses
        .iter()
        .filter_map(|(code, resp)| {
            let label = match code {
                StatusCode::Code(n) if *n >= 400 => n.to_string(),
                StatusCode::Range(n) if *n >= 4 => format!("{n}XX"),
                _ => return None,
            };
            Some(format!("{label}: {}", response_description(resolver, resp)))
        })
        .collect();
    if let Some(default) = &operation.responses.default {
        errors.push(format!("default: {}", response_description(resolver, default)));
    }

    if !errors.is_empty() {
        description.push_str("\n\nError Responses:\n");
        description.push_str(&errors.join("\n"));
    }

    description
}

fn response_description(
    resolver: &LocalResolver,
    resp: &ReferenceOr<openapiv3::Response>,
) -> String {
    match resolver.resolve_response(resp) {
        Ok(r) => r.description,
        Err(_) => match resp {
            ReferenceOr::Reference { reference } => reference.clone(),
            ReferenceOr::Item(r) => r.description.clone(),
        },
    }
}

fn collect_parameters(
    resolver: &LocalResolver,
    path_item_params: &[ReferenceOr<Parameter>],
    operation: &Operation,
    method: &str,
    path: &str,
) -> Result<Vec<ToolParameter>> {
    let merged = merge_parameters(resolver, path_item_params, &operation.parameters)?;

    let mut parameters = Vec::new();
    let mut names: HashSet<String> = HashSet::new();

    for param in &merged {
        let Some(info) = extract_parameter(resolver, param) else {
            tracing::warn!(
                method = %method.to_uppercase(),
                path = %path,
                param = %param.parameter_data_ref().name,
                "cookie parameters are not supported; ignoring"
            );
            continue;
        };

        if !names.insert(info.name.clone()) {
            return Err(OpenApiToolsError::ParamCollision(format!(
                "Parameter '{}' appears multiple times in {} {}",
                info.name,
                method.to_uppercase(),
                path
            )));
        }
        parameters.push(info);
    }

    if let Some(body_ref) = &operation.request_body {
        let body = resolver.resolve_request_body(body_ref)?;
        if let Some(schema_ref) = body
            .content
            .get("application/json")
            .and_then(|c| c.schema.as_ref())
        {
            for bp in extract_body_params(resolver, &body, schema_ref)? {
                if !names.insert(bp.name.clone()) {
                    return Err(OpenApiToolsError::ParamCollision(format!(
                        "Body parameter '{}' collides with path/query parameter in {} {}",
                        bp.name,
                        method.to_uppercase(),
                        path
                    )));
                }
                parameters.push(bp);
            }
        }
    }

    Ok(parameters)
}

/// Merge path-item and operation parameters; operation-level entries override by `(in, name)`.
fn merge_parameters(
    resolver: &LocalResolver,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Result<Vec<Parameter>> {
    fn key_for(p: &Parameter) -> (&'static str, String) {
        let loc = match p {
            Parameter::Path { .. } => "path",
            Parameter::Query { .. } => "query",
            Parameter::Header { .. } => "header",
            Parameter::Cookie { .. } => "cookie",
        };
        (loc, p.parameter_data_ref().name.clone())
    }

    let mut merged: Vec<Parameter> = Vec::new();
    let mut index: HashMap<(&'static str, String), usize> = HashMap::new();

    for p in path_item_params.iter().chain(operation_params) {
        let rp = resolver.resolve_parameter(p)?;
        let k = key_for(&rp);
        if let Some(i) = index.get(&k).copied() {
            merged[i] = rp;
        } else {
            index.insert(k, merged.len());
            merged.push(rp);
        }
    }

    Ok(merged)
}

fn extract_parameter(resolver: &LocalResolver, param: &Parameter) -> Option<ToolParameter> {
    let data = param.parameter_data_ref();
    let (location, required, query) = match param {
        // Path params are always required.
        Parameter::Path { .. } => (ParamLocation::Path, true, None),
        Parameter::Query {
            style,
            allow_reserved,
            allow_empty_value,
            ..
        } => {
            let explode = data
                .explode
                .unwrap_or_else(|| matches!(style, QueryStyle::Form | QueryStyle::DeepObject));
            (
                ParamLocation::Query,
                data.required,
                Some(QuerySerialization {
                    style: style.clone(),
                    explode,
                    allow_reserved: *allow_reserved,
                    allow_empty_value: allow_empty_value.unwrap_or(false),
                }),
            )
        }
        Parameter::Header { .. } => (ParamLocation::Header, data.required, None),
        Parameter::Cookie { .. } => return None,
    };

    let mut schema = match &data.format {
        ParameterSchemaOrContent::Schema(schema_ref) => extract_schema_ref(resolver, schema_ref),
        ParameterSchemaOrContent::Content(_) => json!({"type": "string"}),
    };
    if let Some(obj) = schema.as_object_mut()
        && !obj.contains_key("description")
        && let Some(desc) = &data.description
    {
        obj.insert("description".to_string(), Value::String(desc.clone()));
    }

    Some(ToolParameter {
        name: data.name.clone(),
        location,
        required,
        schema,
        query,
    })
}

fn extract_body_params(
    resolver: &LocalResolver,
    body: &RequestBody,
    schema_ref: &ReferenceOr<Schema>,
) -> Result<Vec<ToolParameter>> {
    let schema = resolver.resolve_schema(schema_ref)?;

    // An optional body cannot make any of its properties required.
    let body_required = body.required;

    if let SchemaKind::Type(Type::Object(obj)) = &schema.schema_kind
        && !obj.properties.is_empty()
    {
        return Ok(obj
            .properties
            .iter()
            .map(|(prop_name, prop_schema)| ToolParameter {
                name: prop_name.clone(),
                location: ParamLocation::Body,
                required: body_required && obj.required.contains(prop_name),
                schema: match prop_schema {
                    ReferenceOr::Item(s) => schema_to_json(s),
                    ReferenceOr::Reference { reference } => json!({"$ref": reference}),
                },
                query: None,
            })
            .collect());
    }

    Ok(vec![ToolParameter {
        name: "body".to_string(),
        location: ParamLocation::BodyPayload,
        required: body_required,
        schema: schema_to_json(&schema),
        query: None,
    }])
}

fn extract_schema_ref(resolver: &LocalResolver, schema_ref: &ReferenceOr<Schema>) -> Value {
    match schema_ref {
        ReferenceOr::Item(schema) => schema_to_json(schema),
        ReferenceOr::Reference { reference } => match resolver.resolve_schema(schema_ref) {
            Ok(s) => schema_to_json(&s),
            Err(_) => json!({"$ref": reference}),
        },
    }
}

/// Convert an `OpenAPI` schema to a JSON Schema value.
fn schema_to_json(schema: &Schema) -> Value {
    let mut result = json!({});

    if let Some(desc) = &schema.schema_data.description {
        result["description"] = json!(desc);
    }
    if let Some(default) = &schema.schema_data.default {
        result["default"] = default.clone();
    }

    match &schema.schema_kind {
        SchemaKind::Type(t) => match t {
            Type::String(s) => {
                result["type"] = json!("string");
                if !s.enumeration.is_empty() {
                    let values: Vec<_> = s.enumeration.iter().flatten().cloned().collect();
                    result["enum"] = json!(values);
                }
            }
            Type::Number(_) => result["type"] = json!("number"),
            Type::Integer(_) => result["type"] = json!("integer"),
            Type::Boolean(_) => result["type"] = json!("boolean"),
            Type::Array(a) => {
                result["type"] = json!("array");
                if let Some(items) = &a.items {
                    result["items"] = match items {
                        ReferenceOr::Item(item) => schema_to_json(item),
                        ReferenceOr::Reference { reference } => json!({"$ref": reference}),
                    };
                }
            }
            Type::Object(o) => {
                result["type"] = json!("object");
                if !o.properties.is_empty() {
                    let mut properties = serde_json::Map::new();
                    for (name, prop) in &o.properties {
                        let value = match prop {
                            ReferenceOr::Item(s) => schema_to_json(s),
                            ReferenceOr::Reference { reference } => json!({"$ref": reference}),
                        };
                        properties.insert(name.clone(), value);
                    }
                    result["properties"] = Value::Object(properties);
                }
                if !o.required.is_empty() {
                    result["required"] = json!(o.required);
                }
            }
        },
        _ => result["type"] = json!("object"),
    }

    result
}

/// Build the input schema for a method from its parameters.
fn build_input_schema(parameters: &[ToolParameter]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required: Vec<String> = Vec::new();

    for param in parameters {
        properties.insert(param.name.clone(), param.schema.clone());
        if param.required {
            required.push(param.name.clone());
        }
    }

    let mut schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }

    schema
}
