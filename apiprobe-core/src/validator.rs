//! Compiles canonical schemas into executable validators.
//!
//! A [`CompiledValidator`] checks arbitrary JSON values against a resolved
//! [`SchemaNode`], collecting every violation found rather than stopping
//! at the first, so a caller can report all problems in one pass.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};

use chrono::DateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::schema::{
    resolve, ArraySchema, NumberSchema, ObjectSchema, SchemaNode, SchemaResolutionError, SchemaSet,
    StringFormat, StringSchema,
};

static UUID_REGEX: OnceLock<Regex> = OnceLock::new();
static URI_SCHEME_REGEX: OnceLock<Regex> = OnceLock::new();

fn uuid_regex() -> &'static Regex {
    UUID_REGEX.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
            .expect("uuid regex")
    })
}

fn uri_scheme_regex() -> &'static Regex {
    URI_SCHEME_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://\S+$").expect("uri scheme regex")
    })
}

/// A single structured validation error.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON-pointer style location of the offending value ("" is the root).
    pub path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of checking a value: empty error list means the value conforms.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub errors: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// An executable validator over a resolved schema tree.
///
/// Deferred (cyclic) references are looked up against the schema set per
/// value node at check time; validation recurses over the value, not the
/// schema, so cyclic schema graphs terminate on finite data.
#[derive(Clone, Debug)]
pub struct CompiledValidator {
    root: SchemaNode,
    set: Arc<SchemaSet>,
    patterns: HashMap<String, Result<Regex, String>>,
}

impl CompiledValidator {
    pub fn schema(&self) -> &SchemaNode {
        &self.root
    }

    /// Checks a value, collecting all violations.
    pub fn check(&self, value: &JsonValue) -> ValidationOutcome {
        let mut errors = Vec::new();
        self.check_node(&self.root, value, "", &mut errors);
        ValidationOutcome { errors }
    }

    fn check_node(
        &self,
        node: &SchemaNode,
        value: &JsonValue,
        path: &str,
        errors: &mut Vec<ValidationIssue>,
    ) {
        match node {
            SchemaNode::Reference(name) => match self.set.get(name) {
                Some(target) => {
                    let target = target.clone();
                    self.check_node(&target, value, path, errors);
                }
                None => errors.push(ValidationIssue::new(
                    path,
                    format!("unresolved schema reference '{name}'"),
                )),
            },
            SchemaNode::String(string) => self.check_string(string, value, path, errors),
            SchemaNode::Number(number) => {
                self.check_number(number, value, path, false, errors)
            }
            SchemaNode::Integer(number) => {
                self.check_number(number, value, path, true, errors)
            }
            SchemaNode::Boolean { nullable } => {
                if value.is_null() && *nullable {
                    return;
                }
                if !value.is_boolean() {
                    errors.push(ValidationIssue::new(
                        path,
                        format!("expected boolean, got {}", json_type(value)),
                    ));
                }
            }
            SchemaNode::Array(array) => self.check_array(array, value, path, errors),
            SchemaNode::Object(object) => self.check_object(object, value, path, errors),
        }
    }

    fn check_string(
        &self,
        schema: &StringSchema,
        value: &JsonValue,
        path: &str,
        errors: &mut Vec<ValidationIssue>,
    ) {
        if value.is_null() && schema.nullable {
            return;
        }
        let Some(text) = value.as_str() else {
            errors.push(ValidationIssue::new(
                path,
                format!("expected string, got {}", json_type(value)),
            ));
            return;
        };

        if !schema.enum_values.is_empty() && !schema.enum_values.iter().any(|entry| entry == text) {
            errors.push(ValidationIssue::new(
                path,
                format!(
                    "value '{text}' is not one of [{}]",
                    schema.enum_values.join(", ")
                ),
            ));
        }

        let length = text.chars().count();
        if let Some(min) = schema.min_length {
            if length < min {
                errors.push(ValidationIssue::new(
                    path,
                    format!("string length {length} is below minLength {min}"),
                ));
            }
        }
        if let Some(max) = schema.max_length {
            if length > max {
                errors.push(ValidationIssue::new(
                    path,
                    format!("string length {length} exceeds maxLength {max}"),
                ));
            }
        }

        if let Some(format) = schema.format {
            if let Some(message) = check_format(format, text) {
                errors.push(ValidationIssue::new(path, message));
            }
        }

        if let Some(pattern) = &schema.pattern {
            match self.patterns.get(pattern) {
                Some(Ok(regex)) => {
                    if !regex.is_match(text) {
                        errors.push(ValidationIssue::new(
                            path,
                            format!("string does not match pattern '{pattern}'"),
                        ));
                    }
                }
                Some(Err(reason)) => errors.push(ValidationIssue::new(
                    path,
                    format!("invalid pattern '{pattern}': {reason}"),
                )),
                None => errors.push(ValidationIssue::new(
                    path,
                    format!("uncompiled pattern '{pattern}'"),
                )),
            }
        }
    }

    fn check_number(
        &self,
        schema: &NumberSchema,
        value: &JsonValue,
        path: &str,
        integer: bool,
        errors: &mut Vec<ValidationIssue>,
    ) {
        if value.is_null() && schema.nullable {
            return;
        }
        let Some(number) = value.as_f64() else {
            let expected = if integer { "integer" } else { "number" };
            errors.push(ValidationIssue::new(
                path,
                format!("expected {expected}, got {}", json_type(value)),
            ));
            return;
        };

        if integer && number.fract() != 0.0 {
            errors.push(ValidationIssue::new(
                path,
                format!("expected integer, got fractional value {number}"),
            ));
        }
        if let Some(minimum) = schema.minimum {
            if number < minimum {
                errors.push(ValidationIssue::new(
                    path,
                    format!("value {number} is below minimum {minimum}"),
                ));
            }
        }
        if let Some(maximum) = schema.maximum {
            if number > maximum {
                errors.push(ValidationIssue::new(
                    path,
                    format!("value {number} exceeds maximum {maximum}"),
                ));
            }
        }
    }

    fn check_array(
        &self,
        schema: &ArraySchema,
        value: &JsonValue,
        path: &str,
        errors: &mut Vec<ValidationIssue>,
    ) {
        if value.is_null() && schema.nullable {
            return;
        }
        let Some(items) = value.as_array() else {
            errors.push(ValidationIssue::new(
                path,
                format!("expected array, got {}", json_type(value)),
            ));
            return;
        };

        if let Some(min) = schema.min_items {
            if items.len() < min {
                errors.push(ValidationIssue::new(
                    path,
                    format!("array length {} is below minItems {min}", items.len()),
                ));
            }
        }
        if let Some(max) = schema.max_items {
            if items.len() > max {
                errors.push(ValidationIssue::new(
                    path,
                    format!("array length {} exceeds maxItems {max}", items.len()),
                ));
            }
        }
        for (index, item) in items.iter().enumerate() {
            let item_path = format!("{path}/{index}");
            self.check_node(&schema.items, item, &item_path, errors);
        }
    }

    fn check_object(
        &self,
        schema: &ObjectSchema,
        value: &JsonValue,
        path: &str,
        errors: &mut Vec<ValidationIssue>,
    ) {
        if value.is_null() && schema.nullable {
            return;
        }
        let Some(object) = value.as_object() else {
            errors.push(ValidationIssue::new(
                path,
                format!("expected object, got {}", json_type(value)),
            ));
            return;
        };

        for name in &schema.required {
            if !object.contains_key(name) {
                errors.push(ValidationIssue::new(
                    path,
                    format!("missing required property '{name}'"),
                ));
            }
        }

        for (name, property) in &schema.properties {
            if let Some(entry) = object.get(name) {
                let property_path = format!("{path}/{name}");
                self.check_node(property, entry, &property_path, errors);
            }
        }

        if schema.strict {
            for name in object.keys() {
                if schema.property(name).is_none() {
                    errors.push(ValidationIssue::new(
                        path,
                        format!("unknown property '{name}'"),
                    ));
                }
            }
        }
    }
}

/// Compiles a schema into an executable validator.
///
/// Resolution happens up front: acyclic references are inlined and every
/// reachable reference target is verified to exist, so a dangling
/// reference fails here rather than at check time.
pub fn compile(
    node: &SchemaNode,
    set: &Arc<SchemaSet>,
) -> Result<CompiledValidator, SchemaResolutionError> {
    let root = resolve(node, set)?;
    verify_references(&root, set)?;
    let mut pattern_strings = BTreeSet::new();
    collect_patterns(&root, set, &mut pattern_strings, &mut BTreeSet::new());
    let patterns = pattern_strings
        .into_iter()
        .map(|pattern| {
            let compiled = Regex::new(&pattern).map_err(|error| error.to_string());
            (pattern, compiled)
        })
        .collect();
    Ok(CompiledValidator {
        root,
        set: Arc::clone(set),
        patterns,
    })
}

fn verify_references(node: &SchemaNode, set: &SchemaSet) -> Result<(), SchemaResolutionError> {
    let mut pending = BTreeSet::new();
    node.referenced_names(&mut pending);
    let mut visited = BTreeSet::new();
    while let Some(name) = pending.iter().next().cloned() {
        pending.remove(&name);
        if !visited.insert(name.clone()) {
            continue;
        }
        let target = set.require(&name)?;
        let mut nested = BTreeSet::new();
        target.referenced_names(&mut nested);
        for nested_name in nested {
            if !visited.contains(&nested_name) {
                pending.insert(nested_name);
            }
        }
    }
    Ok(())
}

fn collect_patterns(
    node: &SchemaNode,
    set: &SchemaSet,
    out: &mut BTreeSet<String>,
    visited: &mut BTreeSet<String>,
) {
    match node {
        SchemaNode::String(string) => {
            if let Some(pattern) = &string.pattern {
                out.insert(pattern.clone());
            }
        }
        SchemaNode::Array(array) => collect_patterns(&array.items, set, out, visited),
        SchemaNode::Object(object) => {
            for (_, property) in &object.properties {
                collect_patterns(property, set, out, visited);
            }
        }
        SchemaNode::Reference(name) => {
            if visited.insert(name.clone()) {
                if let Some(target) = set.get(name) {
                    collect_patterns(target, set, out, visited);
                }
            }
        }
        _ => {}
    }
}

fn check_format(format: StringFormat, text: &str) -> Option<String> {
    match format {
        StringFormat::Uuid => {
            if uuid_regex().is_match(text) {
                None
            } else {
                Some(format!("'{text}' is not a valid uuid"))
            }
        }
        StringFormat::Email => {
            let mut parts = text.splitn(3, '@');
            let local = parts.next().unwrap_or("");
            let domain = parts.next();
            let extra = parts.next();
            match (domain, extra) {
                (Some(domain), None) if !local.is_empty() && !domain.is_empty() => None,
                _ => Some(format!("'{text}' is not a valid email address")),
            }
        }
        StringFormat::DateTime => {
            if DateTime::parse_from_rfc3339(text).is_ok() {
                None
            } else {
                Some(format!("'{text}' is not a valid ISO-8601 timestamp"))
            }
        }
        StringFormat::Uri => {
            if uri_scheme_regex().is_match(text) {
                None
            } else {
                Some(format!("'{text}' is not a valid uri"))
            }
        }
    }
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
