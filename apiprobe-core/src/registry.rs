//! Endpoint-schema registry and discovery.
//!
//! Builds the (path pattern, method) → {request validator, response
//! validator} map from a loaded specification document, then fills in a
//! fixed fallback surface for any known endpoint the document omits, so
//! the registry stays complete even against a stale spec. Pattern
//! matching prefers exact literals; a pattern may contain one wildcard
//! segment (`{id}`) matching any non-slash run.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::warn;
use serde_json::json;

use crate::schema::{from_raw, SchemaNode, SchemaSet};
use crate::spec::{Method, SpecDocument};
use crate::validator::{compile, CompiledValidator};

/// Order status enum mirrored from the backend surface.
pub const ORDER_STATUSES: [&str; 5] =
    ["PENDING", "PROCESSING", "SHIPPED", "DELIVERED", "CANCELLED"];

/// One registered endpoint with its compiled contract.
#[derive(Clone, Debug)]
pub struct EndpointEntry {
    /// Path pattern, possibly containing a single `{wildcard}` segment.
    pub pattern: String,
    pub method: Method,
    pub request: Option<CompiledValidator>,
    pub response: Option<CompiledValidator>,
    /// 2xx statuses the spec (or fallback table) declares.
    pub success_statuses: Vec<u16>,
    /// Component schema names this endpoint exercises, for coverage.
    pub schema_names: Vec<String>,
    /// True when the entry came from the fallback table, not the spec.
    pub from_fallback: bool,
}

impl EndpointEntry {
    /// "METHOD pattern" key used in coverage accounting.
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.pattern)
    }
}

/// The discovered endpoint map.
#[derive(Clone, Debug, Default)]
pub struct EndpointSchemaMap {
    entries: Vec<EndpointEntry>,
    /// Schemas that failed to resolve during discovery; the endpoints
    /// remain registered without the failing side of the contract.
    pub warnings: Vec<String>,
}

impl EndpointSchemaMap {
    pub fn entries(&self) -> &[EndpointEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the entry for a concrete path and method.
    ///
    /// Exact pattern matches win; otherwise wildcard patterns are tried
    /// in registration order and the first match is returned. `None`
    /// means no contract to enforce, never an error.
    pub fn match_endpoint(&self, path: &str, method: Method) -> Option<&EndpointEntry> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.method == method && entry.pattern == path)
        {
            return Some(entry);
        }
        self.entries.iter().find(|entry| {
            entry.method == method
                && entry.pattern != path
                && pattern_matches(&entry.pattern, path)
        })
    }

    fn contains(&self, pattern: &str, method: Method) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.method == method && entry.pattern == pattern)
    }
}

/// True when `pattern` matches `path`, substituting any `{segment}` with
/// a non-empty non-slash run.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    if pattern_segments.len() != path_segments.len() {
        return false;
    }
    pattern_segments
        .iter()
        .zip(path_segments.iter())
        .all(|(pattern_segment, path_segment)| {
            if pattern_segment.starts_with('{') && pattern_segment.ends_with('}') {
                !path_segment.is_empty()
            } else {
                pattern_segment == path_segment
            }
        })
}

/// Substitutes the wildcard segment of a pattern with a concrete id.
pub fn substitute_wildcard(pattern: &str, id: &str) -> String {
    pattern
        .split('/')
        .map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') {
                id
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Discovers the endpoint map from a specification document, then applies
/// the fallback surface for known endpoints the document omits.
pub fn discover(document: &SpecDocument, set: &Arc<SchemaSet>) -> EndpointSchemaMap {
    let mut map = EndpointSchemaMap::default();

    for (path, operation) in document.operations() {
        let mut schema_names = BTreeSet::new();
        let request = operation.request_body.as_ref().and_then(|schema| {
            schema.referenced_names(&mut schema_names);
            compile_logged(schema, set, path, operation.method, "request", &mut map.warnings)
        });
        let response = operation.success_response_schema().and_then(|schema| {
            schema.referenced_names(&mut schema_names);
            compile_logged(schema, set, path, operation.method, "response", &mut map.warnings)
        });
        map.entries.push(EndpointEntry {
            pattern: path.to_string(),
            method: operation.method,
            request,
            response,
            success_statuses: operation.success_statuses(),
            schema_names: schema_names.into_iter().collect(),
            from_fallback: false,
        });
    }

    apply_fallback_entries(&mut map, set);
    map
}

fn compile_logged(
    schema: &SchemaNode,
    set: &Arc<SchemaSet>,
    path: &str,
    method: Method,
    direction: &str,
    warnings: &mut Vec<String>,
) -> Option<CompiledValidator> {
    match compile(schema, set) {
        Ok(validator) => Some(validator),
        Err(error) => {
            let message =
                format!("{method} {path}: failed to compile {direction} schema: {error}");
            warn!("{message}");
            warnings.push(message);
            None
        }
    }
}

fn apply_fallback_entries(map: &mut EndpointSchemaMap, set: &Arc<SchemaSet>) {
    for (method, pattern, request, statuses) in fallback_surface() {
        if map.contains(pattern, method) {
            continue;
        }
        let request = request.and_then(|schema| match compile(&schema, set) {
            Ok(validator) => Some(validator),
            Err(error) => {
                map.warnings.push(format!(
                    "{method} {pattern}: failed to compile fallback schema: {error}"
                ));
                None
            }
        });
        map.entries.push(EndpointEntry {
            pattern: pattern.to_string(),
            method,
            request,
            response: None,
            success_statuses: statuses,
            schema_names: Vec::new(),
            from_fallback: true,
        });
    }
}

type FallbackRow = (Method, &'static str, Option<SchemaNode>, Vec<u16>);

/// The backend's actual HTTP surface, used when the spec is stale.
fn fallback_surface() -> Vec<FallbackRow> {
    vec![
        (Method::Get, "/api/products", None, vec![200]),
        (
            Method::Post,
            "/api/products",
            Some(product_input_schema(true)),
            vec![201],
        ),
        (Method::Get, "/api/products/{id}", None, vec![200]),
        (
            Method::Put,
            "/api/products/{id}",
            Some(product_input_schema(false)),
            vec![200],
        ),
        (Method::Get, "/api/categories", None, vec![200]),
        (
            Method::Post,
            "/api/categories",
            Some(category_input_schema()),
            vec![201],
        ),
        (Method::Get, "/api/categories/{id}", None, vec![200]),
        (
            Method::Post,
            "/api/users",
            Some(user_input_schema()),
            vec![201],
        ),
        (Method::Get, "/api/users/{id}", None, vec![200]),
        (Method::Get, "/api/orders", None, vec![200]),
        (
            Method::Post,
            "/api/orders",
            Some(order_input_schema()),
            vec![201],
        ),
        (Method::Get, "/api/orders/{id}", None, vec![200]),
        (
            Method::Put,
            "/api/orders/{id}/status",
            Some(order_status_schema()),
            vec![200],
        ),
        (Method::Get, "/api/salespersons", None, vec![200]),
        (
            Method::Post,
            "/api/salespersons",
            Some(salesperson_input_schema(true)),
            vec![201],
        ),
        (Method::Get, "/api/salespersons/{id}", None, vec![200]),
        (
            Method::Put,
            "/api/salespersons/{id}",
            Some(salesperson_input_schema(false)),
            vec![200],
        ),
        (Method::Delete, "/api/salespersons/{id}", None, vec![200, 204]),
    ]
}

fn product_input_schema(create: bool) -> SchemaNode {
    let required = if create {
        json!(["name", "price", "stockQuantity", "categoryId"])
    } else {
        json!([])
    };
    from_raw(&json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "minLength": 1, "maxLength": 200 },
            "description": { "type": "string" },
            "price": { "type": "number", "minimum": 0.01 },
            "stockQuantity": { "type": "integer", "minimum": 0 },
            "categoryId": { "type": "string", "format": "uuid" }
        },
        "required": required,
        "additionalProperties": false
    }))
}

fn category_input_schema() -> SchemaNode {
    from_raw(&json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "minLength": 1, "maxLength": 100 },
            "description": { "type": "string" }
        },
        "required": ["name"],
        "additionalProperties": false
    }))
}

fn user_input_schema() -> SchemaNode {
    from_raw(&json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "minLength": 1 },
            "email": { "type": "string", "format": "email" },
            "password": { "type": "string", "minLength": 8 },
            "picture": { "type": "string", "format": "uri" }
        },
        "required": ["name", "email"],
        "additionalProperties": false
    }))
}

fn order_input_schema() -> SchemaNode {
    from_raw(&json!({
        "type": "object",
        "properties": {
            "userId": { "type": "string", "format": "uuid" },
            "salespersonId": { "type": "string", "format": "uuid" },
            "orderItems": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "productId": { "type": "string", "format": "uuid" },
                        "quantity": { "type": "integer", "minimum": 1 }
                    },
                    "required": ["productId", "quantity"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["userId", "orderItems"],
        "additionalProperties": false
    }))
}

fn order_status_schema() -> SchemaNode {
    from_raw(&json!({
        "type": "object",
        "properties": {
            "status": { "type": "string", "enum": ORDER_STATUSES }
        },
        "required": ["status"],
        "additionalProperties": false
    }))
}

fn salesperson_input_schema(create: bool) -> SchemaNode {
    let required = if create { json!(["name"]) } else { json!([]) };
    from_raw(&json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "minLength": 1 },
            "email": { "type": "string", "format": "email" },
            "phone": { "type": "string" },
            "region": { "type": "string" }
        },
        "required": required,
        "additionalProperties": false
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec;
    use serde_json::json;

    fn minimal_document() -> SpecDocument {
        spec::from_value(&json!({
            "paths": {
                "/api/products": {
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
                },
                "/api/products/{id}": {
                    "get": {
                        "responses": {
                            "200": {
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
                        "properties": { "name": { "type": "string", "minLength": 1 } },
                        "required": ["name"],
                        "additionalProperties": false
                    }
                }
            }
        }))
        .expect("parse document")
    }

    #[test]
    fn discover_registers_spec_endpoints_with_validators() {
        let document = minimal_document();
        let set = Arc::new(document.schemas.clone());
        let map = discover(&document, &set);
        let entry = map
            .match_endpoint("/api/products", Method::Post)
            .expect("post entry");
        assert!(entry.request.is_some());
        assert!(entry.response.is_some());
        assert!(!entry.from_fallback);
        assert_eq!(entry.success_statuses, vec![201]);
        assert!(entry.schema_names.contains(&"Product".to_string()));
    }

    #[test]
    fn discover_fills_fallback_for_missing_endpoints() {
        let document = minimal_document();
        let set = Arc::new(document.schemas.clone());
        let map = discover(&document, &set);
        let entry = map
            .match_endpoint("/api/orders", Method::Post)
            .expect("fallback order entry");
        assert!(entry.from_fallback);
        assert!(entry.request.is_some());
    }

    #[test]
    fn exact_match_beats_wildcard() {
        let document = minimal_document();
        let set = Arc::new(document.schemas.clone());
        let map = discover(&document, &set);
        let entry = map
            .match_endpoint("/api/products", Method::Post)
            .expect("exact entry");
        assert_eq!(entry.pattern, "/api/products");
    }

    #[test]
    fn wildcard_matches_id_segment_only() {
        assert!(pattern_matches(
            "/api/products/{id}",
            "/api/products/550e8400-e29b-41d4-a716-446655440000"
        ));
        assert!(!pattern_matches("/api/products/{id}", "/api/products"));
        assert!(!pattern_matches(
            "/api/products/{id}",
            "/api/products/abc/def"
        ));
    }

    #[test]
    fn unknown_path_yields_no_contract() {
        let document = minimal_document();
        let set = Arc::new(document.schemas.clone());
        let map = discover(&document, &set);
        assert!(map.match_endpoint("/api/unknown", Method::Get).is_none());
    }

    #[test]
    fn substitute_wildcard_replaces_placeholder() {
        assert_eq!(
            substitute_wildcard("/api/orders/{id}/status", "abc"),
            "/api/orders/abc/status"
        );
    }

    #[test]
    fn dangling_reference_downgrades_to_warning() {
        let document = spec::from_value(&json!({
            "paths": {
                "/api/ghosts": {
                    "get": {
                        "responses": {
                            "200": {
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Ghost" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }))
        .expect("parse document");
        let set = Arc::new(document.schemas.clone());
        let map = discover(&document, &set);
        let entry = map
            .match_endpoint("/api/ghosts", Method::Get)
            .expect("entry survives");
        assert!(entry.response.is_none());
        assert!(!map.warnings.is_empty());
    }
}
