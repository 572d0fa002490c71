//! `OpenAPI` `$ref` resolver.
//!
//! The `openapiv3` crate models `$ref`s using `ReferenceOr<T>` but does not resolve them.
//! This resolver follows local JSON-pointer refs (`#/components/...`) within a single document.
//! Refs into other files or URLs are reported as unresolved; callers decide whether that is fatal.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::{OpenAPI, Parameter, PathItem, ReferenceOr, RequestBody, Response, Schema};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug)]
pub struct LocalResolver {
    doc: Value,
}

impl LocalResolver {
    /// Create a resolver over one parsed document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be converted into JSON for pointer lookups.
    pub fn new(spec: &OpenAPI) -> Result<Self> {
        let doc = serde_json::to_value(spec)?;
        Ok(Self { doc })
    }

    /// Resolve a parameter, following `$ref` chains.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is external, dangling, cyclic or of the wrong shape.
    pub fn resolve_parameter(&self, param: &ReferenceOr<Parameter>) -> Result<Parameter> {
        self.resolve_reference_or(param)
    }

    /// Resolve a request body, following `$ref` chains.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is external, dangling, cyclic or of the wrong shape.
    pub fn resolve_request_body(&self, body: &ReferenceOr<RequestBody>) -> Result<RequestBody> {
        self.resolve_reference_or(body)
    }

    /// Resolve a schema, following `$ref` chains.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is external, dangling, cyclic or of the wrong shape.
    pub fn resolve_schema(&self, schema: &ReferenceOr<Schema>) -> Result<Schema> {
        self.resolve_reference_or(schema)
    }

    /// Resolve a response, following `$ref` chains.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is external, dangling, cyclic or of the wrong shape.
    pub fn resolve_response(&self, response: &ReferenceOr<Response>) -> Result<Response> {
        self.resolve_reference_or(response)
    }

    /// Resolve a path item, following `$ref` chains.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is external, dangling, cyclic or of the wrong shape.
    pub fn resolve_path_item(&self, item: &ReferenceOr<PathItem>) -> Result<PathItem> {
        self.resolve_reference_or(item)
    }

    fn resolve_reference_or<T>(&self, r: &ReferenceOr<T>) -> Result<T>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut cur: ReferenceOr<T> = r.clone();

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok(item),
                ReferenceOr::Reference { reference } => {
                    if !seen.insert(reference.clone()) {
                        return Err(OpenApiToolsError::OpenApi(format!(
                            "Cyclic $ref detected while resolving: {reference}",
                        )));
                    }

                    let value = self.lookup(&reference)?;
                    cur = serde_json::from_value(value.clone()).map_err(|e| {
                        OpenApiToolsError::OpenApi(format!(
                            "Failed to deserialize referenced value '{reference}' as expected type: {e}",
                        ))
                    })?;
                }
            }
        }
    }

    fn lookup(&self, reference: &str) -> Result<&Value> {
        let Some(fragment) = reference.strip_prefix('#') else {
            return Err(OpenApiToolsError::OpenApi(format!(
                "External $ref is not supported: {reference}",
            )));
        };

        if fragment.is_empty() {
            return Ok(&self.doc);
        }
        if !fragment.starts_with('/') {
            return Err(OpenApiToolsError::OpenApi(format!(
                "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}",
            )));
        }

        self.doc.pointer(fragment).ok_or_else(|| {
            OpenApiToolsError::OpenApi(format!(
                "Unresolved $ref '{reference}' (missing pointer '{fragment}')",
            ))
        })
    }
}
