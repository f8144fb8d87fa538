//! Specification document loading.
//!
//! Parses an OpenAPI-like JSON document into an in-memory structural
//! model: paths in declaration order, operations per method, and the
//! `components.schemas` dictionary as a [`SchemaSet`]. The document is
//! immutable after load; refresh means reloading wholesale.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::schema::{from_raw, SchemaNode, SchemaSet};

/// HTTP methods the engine drives.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    pub fn parse(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "get" => Some(Method::Get),
            "post" => Some(Method::Post),
            "put" => Some(Method::Put),
            "delete" => Some(Method::Delete),
            "patch" => Some(Method::Patch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameter declared on an operation.
#[derive(Clone, Debug)]
pub struct ParameterSpec {
    pub name: String,
    /// `query`, `path`, or whatever the document declares.
    pub location: String,
    pub required: bool,
    pub schema: Option<SchemaNode>,
}

/// A declared response: status code string plus optional body schema.
#[derive(Clone, Debug)]
pub struct ResponseSpec {
    pub status: String,
    pub schema: Option<SchemaNode>,
}

/// One operation under a path.
#[derive(Clone, Debug)]
pub struct OperationSpec {
    pub method: Method,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub parameters: Vec<ParameterSpec>,
    pub request_body: Option<SchemaNode>,
    pub responses: Vec<ResponseSpec>,
}

impl OperationSpec {
    /// Declared 2xx status codes, in declaration order.
    pub fn success_statuses(&self) -> Vec<u16> {
        self.responses
            .iter()
            .filter_map(|response| response.status.parse::<u16>().ok())
            .filter(|status| (200..300).contains(status))
            .collect()
    }

    /// The first 2xx response schema, preferring 200 then 201.
    pub fn success_response_schema(&self) -> Option<&SchemaNode> {
        for preferred in ["200", "201"] {
            if let Some(response) = self
                .responses
                .iter()
                .find(|response| response.status == preferred)
            {
                if let Some(schema) = &response.schema {
                    return Some(schema);
                }
            }
        }
        self.responses
            .iter()
            .filter(|response| {
                response
                    .status
                    .parse::<u16>()
                    .map(|status| (200..300).contains(&status))
                    .unwrap_or(false)
            })
            .find_map(|response| response.schema.as_ref())
    }
}

/// A path entry with its operations, in document order.
#[derive(Clone, Debug)]
pub struct PathSpec {
    pub path: String,
    pub operations: Vec<OperationSpec>,
}

/// Root of the loaded specification document.
#[derive(Clone, Debug, Default)]
pub struct SpecDocument {
    pub paths: Vec<PathSpec>,
    pub schemas: SchemaSet,
}

impl SpecDocument {
    /// Iterates every (path, operation) pair in document order.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &OperationSpec)> {
        self.paths.iter().flat_map(|path| {
            path.operations
                .iter()
                .map(move |operation| (path.path.as_str(), operation))
        })
    }

    pub fn operation(&self, path: &str, method: Method) -> Option<&OperationSpec> {
        self.paths
            .iter()
            .find(|entry| entry.path == path)
            .and_then(|entry| {
                entry
                    .operations
                    .iter()
                    .find(|operation| operation.method == method)
            })
    }
}

/// Errors raised while loading a specification document.
#[derive(Debug)]
pub enum SpecLoadError {
    /// The file could not be read.
    Unreadable { path: String, message: String },
    /// The file is not valid JSON.
    Unparseable { message: String },
    /// The document lacks a usable `paths` object.
    MissingPaths,
}

impl fmt::Display for SpecLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecLoadError::Unreadable { path, message } => {
                write!(f, "failed to read spec '{path}': {message}")
            }
            SpecLoadError::Unparseable { message } => {
                write!(f, "failed to parse spec: {message}")
            }
            SpecLoadError::MissingPaths => write!(f, "spec has no 'paths' object"),
        }
    }
}

impl std::error::Error for SpecLoadError {}

/// Loads a specification document from a file path.
pub fn load(path: impl AsRef<Path>) -> Result<SpecDocument, SpecLoadError> {
    let path = path.as_ref();
    let payload = fs::read_to_string(path).map_err(|error| SpecLoadError::Unreadable {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    load_str(&payload)
}

/// Loads a specification document from a JSON string.
pub fn load_str(payload: &str) -> Result<SpecDocument, SpecLoadError> {
    let raw: JsonValue =
        serde_json::from_str(payload).map_err(|error| SpecLoadError::Unparseable {
            message: error.to_string(),
        })?;
    from_value(&raw)
}

/// Builds a document model from already-parsed JSON.
pub fn from_value(raw: &JsonValue) -> Result<SpecDocument, SpecLoadError> {
    let raw_paths = raw
        .get("paths")
        .and_then(JsonValue::as_object)
        .ok_or(SpecLoadError::MissingPaths)?;

    let mut paths = Vec::with_capacity(raw_paths.len());
    for (path, raw_item) in raw_paths {
        let Some(raw_item) = raw_item.as_object() else {
            continue;
        };
        let mut operations = Vec::new();
        for (method_label, raw_operation) in raw_item {
            let Some(method) = Method::parse(method_label) else {
                continue;
            };
            operations.push(parse_operation(method, raw_operation));
        }
        paths.push(PathSpec {
            path: path.clone(),
            operations,
        });
    }

    let mut schemas = SchemaSet::new();
    if let Some(raw_schemas) = raw
        .pointer("/components/schemas")
        .and_then(JsonValue::as_object)
    {
        for (name, raw_schema) in raw_schemas {
            schemas.insert(name.clone(), from_raw(raw_schema));
        }
    }

    Ok(SpecDocument { paths, schemas })
}

fn parse_operation(method: Method, raw: &JsonValue) -> OperationSpec {
    let summary = raw
        .get("summary")
        .and_then(JsonValue::as_str)
        .map(str::to_string);
    let description = raw
        .get("description")
        .and_then(JsonValue::as_str)
        .map(str::to_string);
    let tags = raw
        .get("tags")
        .and_then(JsonValue::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let parameters = raw
        .get("parameters")
        .and_then(JsonValue::as_array)
        .map(|values| values.iter().filter_map(parse_parameter).collect())
        .unwrap_or_default();

    let request_body = raw
        .pointer("/requestBody/content/application~1json/schema")
        .map(from_raw);

    let mut responses = Vec::new();
    if let Some(raw_responses) = raw.get("responses").and_then(JsonValue::as_object) {
        for (status, raw_response) in raw_responses {
            let schema = raw_response
                .pointer("/content/application~1json/schema")
                .map(from_raw);
            responses.push(ResponseSpec {
                status: status.clone(),
                schema,
            });
        }
    }

    OperationSpec {
        method,
        summary,
        description,
        tags,
        parameters,
        request_body,
        responses,
    }
}

fn parse_parameter(raw: &JsonValue) -> Option<ParameterSpec> {
    let name = raw.get("name").and_then(JsonValue::as_str)?;
    Some(ParameterSpec {
        name: name.to_string(),
        location: raw
            .get("in")
            .and_then(JsonValue::as_str)
            .unwrap_or("query")
            .to_string(),
        required: raw
            .get("required")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false),
        schema: raw.get("schema").map(from_raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_spec() -> JsonValue {
        json!({
            "openapi": "3.0.0",
            "paths": {
                "/api/products": {
                    "get": {
                        "summary": "List products",
                        "parameters": [
                            { "name": "page", "in": "query", "schema": { "type": "integer" } }
                        ],
                        "responses": {
                            "200": {
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/Product" }
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "post": {
                        "requestBody": {
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/ProductInput" }
                                }
                            }
                        },
                        "responses": {
                            "201": {
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Product" }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Product": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "format": "uuid" },
                            "name": { "type": "string" }
                        },
                        "required": ["id", "name"]
                    },
                    "ProductInput": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "minLength": 1 }
                        },
                        "required": ["name"],
                        "additionalProperties": false
                    }
                }
            }
        })
    }

    #[test]
    fn from_value_parses_paths_and_schemas() {
        let document = from_value(&sample_spec()).expect("parse spec");
        assert_eq!(document.paths.len(), 1);
        assert_eq!(document.paths[0].operations.len(), 2);
        assert_eq!(document.schemas.len(), 2);
        assert!(document.schemas.get("Product").is_some());
    }

    #[test]
    fn operation_lookup_finds_methods() {
        let document = from_value(&sample_spec()).expect("parse spec");
        let post = document
            .operation("/api/products", Method::Post)
            .expect("post operation");
        assert!(post.request_body.is_some());
        assert_eq!(post.success_statuses(), vec![201]);
    }

    #[test]
    fn success_response_schema_prefers_200_over_201() {
        let document = from_value(&sample_spec()).expect("parse spec");
        let get = document
            .operation("/api/products", Method::Get)
            .expect("get operation");
        assert!(get.success_response_schema().is_some());
    }

    #[test]
    fn load_str_rejects_invalid_json() {
        let error = load_str("not json").expect_err("invalid payload");
        assert!(matches!(error, SpecLoadError::Unparseable { .. }));
    }

    #[test]
    fn from_value_requires_paths() {
        let error = from_value(&json!({ "openapi": "3.0.0" })).expect_err("no paths");
        assert!(matches!(error, SpecLoadError::MissingPaths));
    }

    #[test]
    fn load_reports_unreadable_file() {
        let error = load("/nonexistent/spec.json").expect_err("missing file");
        assert!(matches!(error, SpecLoadError::Unreadable { .. }));
    }
}
