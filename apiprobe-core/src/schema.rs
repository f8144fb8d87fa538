//! Canonical schema tree and reference resolution.
//!
//! Schemas loaded from a specification document are normalized into
//! [`SchemaNode`], a closed tagged union that validators and generators
//! switch over exhaustively. Named definitions live in a [`SchemaSet`]
//! arena; a [`SchemaNode::Reference`] is a handle into that arena rather
//! than an inlined copy, so mutually referential entities (Order,
//! OrderItem, Product, Category) stay finite.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::Value as JsonValue;

/// String formats the validator and generator understand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StringFormat {
    Uuid,
    Email,
    DateTime,
    Uri,
}

impl StringFormat {
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "uuid" => Some(StringFormat::Uuid),
            "email" => Some(StringFormat::Email),
            "date-time" => Some(StringFormat::DateTime),
            "uri" => Some(StringFormat::Uri),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StringFormat::Uuid => "uuid",
            StringFormat::Email => "email",
            StringFormat::DateTime => "date-time",
            StringFormat::Uri => "uri",
        }
    }
}

/// Constraints carried by a string schema.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StringSchema {
    pub format: Option<StringFormat>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub enum_values: Vec<String>,
    pub nullable: bool,
}

/// Constraints shared by number and integer schemas.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NumberSchema {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub nullable: bool,
}

/// Constraints carried by an array schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ArraySchema {
    pub items: Box<SchemaNode>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub nullable: bool,
}

/// Constraints carried by an object schema.
///
/// Properties preserve declaration order. `strict` objects reject any
/// property not declared in `properties`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectSchema {
    pub properties: Vec<(String, SchemaNode)>,
    pub required: Vec<String>,
    pub nullable: bool,
    pub strict: bool,
}

impl ObjectSchema {
    pub fn property(&self, name: &str) -> Option<&SchemaNode> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, node)| node)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|entry| entry == name)
    }
}

/// Canonical schema tree.
#[derive(Clone, Debug, PartialEq)]
pub enum SchemaNode {
    String(StringSchema),
    Number(NumberSchema),
    Integer(NumberSchema),
    Boolean { nullable: bool },
    Array(ArraySchema),
    Object(ObjectSchema),
    /// Handle into the [`SchemaSet`] arena, resolved on demand.
    Reference(String),
}

impl SchemaNode {
    /// Short label used in validation error messages.
    pub fn type_label(&self) -> &'static str {
        match self {
            SchemaNode::String(_) => "string",
            SchemaNode::Number(_) => "number",
            SchemaNode::Integer(_) => "integer",
            SchemaNode::Boolean { .. } => "boolean",
            SchemaNode::Array(_) => "array",
            SchemaNode::Object(_) => "object",
            SchemaNode::Reference(_) => "reference",
        }
    }

    /// Collects the names of every referenced definition in the tree.
    pub fn referenced_names(&self, out: &mut BTreeSet<String>) {
        match self {
            SchemaNode::Reference(name) => {
                out.insert(name.clone());
            }
            SchemaNode::Array(array) => array.items.referenced_names(out),
            SchemaNode::Object(object) => {
                for (_, node) in &object.properties {
                    node.referenced_names(out);
                }
            }
            _ => {}
        }
    }
}

/// Error raised when a reference cannot be resolved against the arena.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchemaResolutionError {
    /// The definition name that was not found.
    pub missing: String,
}

impl fmt::Display for SchemaResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unresolved schema reference '{}'", self.missing)
    }
}

impl std::error::Error for SchemaResolutionError {}

/// Arena of named schema definitions (the `components.schemas` dictionary).
#[derive(Clone, Debug, Default)]
pub struct SchemaSet {
    definitions: BTreeMap<String, SchemaNode>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, node: SchemaNode) {
        self.definitions.insert(name.into(), node);
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.definitions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.definitions.keys()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Looks up a definition, failing with the missing name.
    pub fn require(&self, name: &str) -> Result<&SchemaNode, SchemaResolutionError> {
        self.definitions
            .get(name)
            .ok_or_else(|| SchemaResolutionError {
                missing: name.to_string(),
            })
    }

    /// Names of definitions that participate in a reference cycle.
    ///
    /// References to these names are never inlined by [`resolve`]; they
    /// stay as handles and are looked up on demand, which is what keeps
    /// resolution both terminating and idempotent on cyclic graphs.
    pub fn cyclic_names(&self) -> BTreeSet<String> {
        let mut cyclic = BTreeSet::new();
        for name in self.definitions.keys() {
            let mut stack = Vec::new();
            if self.reaches(name, name, &mut stack) {
                cyclic.insert(name.clone());
            }
        }
        // A name that can reach a cyclic name through references must also
        // stay deferred, otherwise inlining it would inline the cycle.
        loop {
            let mut grew = false;
            for (name, node) in &self.definitions {
                if cyclic.contains(name) {
                    continue;
                }
                let mut referenced = BTreeSet::new();
                node.referenced_names(&mut referenced);
                if referenced.iter().any(|target| cyclic.contains(target)) {
                    cyclic.insert(name.clone());
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
        cyclic
    }

    fn reaches(&self, from: &str, target: &str, stack: &mut Vec<String>) -> bool {
        if stack.iter().any(|entry| entry == from) {
            return false;
        }
        stack.push(from.to_string());
        let mut referenced = BTreeSet::new();
        if let Some(node) = self.definitions.get(from) {
            node.referenced_names(&mut referenced);
        }
        let found = referenced.iter().any(|name| {
            name == target || self.reaches(name, target, stack)
        });
        stack.pop();
        found
    }
}

/// Resolves a schema tree against the definition arena.
///
/// References to acyclic definitions are inlined recursively; references
/// to definitions on a cycle are validated for existence and left as
/// handles, to be looked up lazily per value during validation and
/// generation. The result is idempotent: resolving an already-resolved
/// tree returns an equivalent tree.
pub fn resolve(node: &SchemaNode, set: &SchemaSet) -> Result<SchemaNode, SchemaResolutionError> {
    let cyclic = set.cyclic_names();
    resolve_with(node, set, &cyclic)
}

fn resolve_with(
    node: &SchemaNode,
    set: &SchemaSet,
    cyclic: &BTreeSet<String>,
) -> Result<SchemaNode, SchemaResolutionError> {
    match node {
        SchemaNode::Reference(name) => {
            let target = set.require(name)?;
            if cyclic.contains(name) {
                // Existence is checked; expansion is deferred.
                Ok(SchemaNode::Reference(name.clone()))
            } else {
                resolve_with(target, set, cyclic)
            }
        }
        SchemaNode::Array(array) => Ok(SchemaNode::Array(ArraySchema {
            items: Box::new(resolve_with(&array.items, set, cyclic)?),
            min_items: array.min_items,
            max_items: array.max_items,
            nullable: array.nullable,
        })),
        SchemaNode::Object(object) => {
            let mut properties = Vec::with_capacity(object.properties.len());
            for (name, property) in &object.properties {
                properties.push((name.clone(), resolve_with(property, set, cyclic)?));
            }
            Ok(SchemaNode::Object(ObjectSchema {
                properties,
                required: object.required.clone(),
                nullable: object.nullable,
                strict: object.strict,
            }))
        }
        other => Ok(other.clone()),
    }
}

/// Converts a raw JSON schema fragment into a canonical node.
///
/// Understands the OpenAPI-style subset the engine consumes: `type`,
/// `format`, `enum`, length/bound/item constraints, `properties`,
/// `required`, `nullable`, `additionalProperties: false` (strictness) and
/// `$ref` into `#/components/schemas/<Name>`.
pub fn from_raw(raw: &JsonValue) -> SchemaNode {
    if let Some(reference) = raw.get("$ref").and_then(JsonValue::as_str) {
        let name = reference
            .rsplit('/')
            .next()
            .unwrap_or(reference)
            .to_string();
        return SchemaNode::Reference(name);
    }

    let nullable = raw
        .get("nullable")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false);
    let schema_type = raw.get("type").and_then(JsonValue::as_str).unwrap_or("object");

    match schema_type {
        "string" => SchemaNode::String(StringSchema {
            format: raw
                .get("format")
                .and_then(JsonValue::as_str)
                .and_then(StringFormat::parse),
            min_length: raw
                .get("minLength")
                .and_then(JsonValue::as_u64)
                .map(|value| value as usize),
            max_length: raw
                .get("maxLength")
                .and_then(JsonValue::as_u64)
                .map(|value| value as usize),
            pattern: raw
                .get("pattern")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            enum_values: raw
                .get("enum")
                .and_then(JsonValue::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(JsonValue::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            nullable,
        }),
        "number" => SchemaNode::Number(number_schema(raw, nullable)),
        "integer" => SchemaNode::Integer(number_schema(raw, nullable)),
        "boolean" => SchemaNode::Boolean { nullable },
        "array" => {
            let items = raw
                .get("items")
                .map(from_raw)
                .unwrap_or(SchemaNode::Object(ObjectSchema::default()));
            SchemaNode::Array(ArraySchema {
                items: Box::new(items),
                min_items: raw
                    .get("minItems")
                    .and_then(JsonValue::as_u64)
                    .map(|value| value as usize),
                max_items: raw
                    .get("maxItems")
                    .and_then(JsonValue::as_u64)
                    .map(|value| value as usize),
                nullable,
            })
        }
        _ => {
            let mut properties = Vec::new();
            if let Some(raw_properties) = raw.get("properties").and_then(JsonValue::as_object) {
                for (name, property) in raw_properties {
                    properties.push((name.clone(), from_raw(property)));
                }
            }
            let required = raw
                .get("required")
                .and_then(JsonValue::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(JsonValue::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let strict = matches!(
                raw.get("additionalProperties"),
                Some(JsonValue::Bool(false))
            );
            SchemaNode::Object(ObjectSchema {
                properties,
                required,
                nullable,
                strict,
            })
        }
    }
}

fn number_schema(raw: &JsonValue, nullable: bool) -> NumberSchema {
    NumberSchema {
        minimum: raw.get("minimum").and_then(JsonValue::as_f64),
        maximum: raw.get("maximum").and_then(JsonValue::as_f64),
        nullable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_like_set() -> SchemaSet {
        let mut set = SchemaSet::new();
        set.insert(
            "Order",
            SchemaNode::Object(ObjectSchema {
                properties: vec![
                    ("id".to_string(), SchemaNode::String(StringSchema::default())),
                    (
                        "items".to_string(),
                        SchemaNode::Array(ArraySchema {
                            items: Box::new(SchemaNode::Reference("OrderItem".to_string())),
                            min_items: Some(1),
                            max_items: None,
                            nullable: false,
                        }),
                    ),
                ],
                required: vec!["id".to_string(), "items".to_string()],
                nullable: false,
                strict: false,
            }),
        );
        set.insert(
            "OrderItem",
            SchemaNode::Object(ObjectSchema {
                properties: vec![(
                    "order".to_string(),
                    SchemaNode::Reference("Order".to_string()),
                )],
                required: Vec::new(),
                nullable: false,
                strict: false,
            }),
        );
        set.insert(
            "Category",
            SchemaNode::Object(ObjectSchema {
                properties: vec![(
                    "name".to_string(),
                    SchemaNode::String(StringSchema::default()),
                )],
                required: vec!["name".to_string()],
                nullable: false,
                strict: false,
            }),
        );
        set
    }

    #[test]
    fn cyclic_names_flags_mutual_references() {
        let set = order_like_set();
        let cyclic = set.cyclic_names();
        assert!(cyclic.contains("Order"));
        assert!(cyclic.contains("OrderItem"));
        assert!(!cyclic.contains("Category"));
    }

    #[test]
    fn resolve_inlines_acyclic_references() {
        let set = order_like_set();
        let node = SchemaNode::Reference("Category".to_string());
        let resolved = resolve(&node, &set).expect("resolve category");
        match resolved {
            SchemaNode::Object(object) => {
                assert!(object.property("name").is_some());
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn resolve_defers_cyclic_references() {
        let set = order_like_set();
        let node = SchemaNode::Reference("Order".to_string());
        let resolved = resolve(&node, &set).expect("resolve order");
        assert_eq!(resolved, SchemaNode::Reference("Order".to_string()));
    }

    #[test]
    fn resolve_is_idempotent() {
        let set = order_like_set();
        let node = SchemaNode::Object(ObjectSchema {
            properties: vec![
                (
                    "category".to_string(),
                    SchemaNode::Reference("Category".to_string()),
                ),
                (
                    "order".to_string(),
                    SchemaNode::Reference("Order".to_string()),
                ),
            ],
            required: Vec::new(),
            nullable: false,
            strict: false,
        });
        let once = resolve(&node, &set).expect("first resolve");
        let twice = resolve(&once, &set).expect("second resolve");
        assert_eq!(once, twice);
    }

    #[test]
    fn resolve_reports_missing_reference_by_name() {
        let set = order_like_set();
        let node = SchemaNode::Reference("Ghost".to_string());
        let error = resolve(&node, &set).expect_err("dangling reference");
        assert_eq!(error.missing, "Ghost");
    }

    #[test]
    fn from_raw_parses_string_constraints() {
        let raw = json!({
            "type": "string",
            "format": "uuid",
            "minLength": 36,
            "maxLength": 36
        });
        match from_raw(&raw) {
            SchemaNode::String(string) => {
                assert_eq!(string.format, Some(StringFormat::Uuid));
                assert_eq!(string.min_length, Some(36));
                assert_eq!(string.max_length, Some(36));
            }
            other => panic!("expected string schema, got {other:?}"),
        }
    }

    #[test]
    fn from_raw_parses_strict_objects() {
        let raw = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"],
            "additionalProperties": false
        });
        match from_raw(&raw) {
            SchemaNode::Object(object) => {
                assert!(object.strict);
                assert!(object.is_required("name"));
            }
            other => panic!("expected object schema, got {other:?}"),
        }
    }

    #[test]
    fn from_raw_extracts_reference_names() {
        let raw = json!({ "$ref": "#/components/schemas/Product" });
        assert_eq!(
            from_raw(&raw),
            SchemaNode::Reference("Product".to_string())
        );
    }
}
