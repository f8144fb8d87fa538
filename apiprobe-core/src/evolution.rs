//! Schema evolution and migration checking.
//!
//! Maintains an ordered chain of schema versions, each carrying declared
//! breaking changes, deprecated fields, and outgoing migrations. Checks
//! cross-version compatibility of generated data, replays migration
//! chains, and cross-checks breaking-change declarations. Incompatibility
//! across a declared-breaking migration is an expected outcome, not a
//! defect; a version that cannot validate its own generated data always
//! is.

use std::fmt;
use std::sync::Arc;

use log::info;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use crate::generator::{DataGenerator, GeneratorConfig};
use crate::schema::{from_raw, SchemaNode, SchemaSet};
use crate::validator::compile;

/// A migration function over a JSON value. `add` computes from the whole
/// source record; `modify` computes from the current field value.
pub type TransformFn = Arc<dyn Fn(&JsonValue) -> JsonValue + Send + Sync>;

/// Value source for an `add` transformation.
#[derive(Clone)]
pub enum AddValue {
    Static(JsonValue),
    Computed(TransformFn),
}

/// One field-level migration step.
#[derive(Clone)]
pub enum FieldTransformation {
    /// Sets `field` to a static value or a function of the source record.
    Add { field: String, value: AddValue },
    /// Deletes `field`.
    Remove { field: String },
    /// Replaces the value of `field`; no-op when the field is absent.
    Modify { field: String, apply: TransformFn },
    /// Moves the value under `from` to `to`; no-op when `from` is absent.
    Rename { from: String, to: String },
}

impl fmt::Debug for FieldTransformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldTransformation::Add { field, .. } => write!(f, "Add({field})"),
            FieldTransformation::Remove { field } => write!(f, "Remove({field})"),
            FieldTransformation::Modify { field, .. } => write!(f, "Modify({field})"),
            FieldTransformation::Rename { from, to } => write!(f, "Rename({from} -> {to})"),
        }
    }
}

impl FieldTransformation {
    pub fn add(field: impl Into<String>, value: JsonValue) -> Self {
        FieldTransformation::Add {
            field: field.into(),
            value: AddValue::Static(value),
        }
    }

    pub fn add_computed(field: impl Into<String>, compute: TransformFn) -> Self {
        FieldTransformation::Add {
            field: field.into(),
            value: AddValue::Computed(compute),
        }
    }

    pub fn remove(field: impl Into<String>) -> Self {
        FieldTransformation::Remove {
            field: field.into(),
        }
    }

    pub fn modify(field: impl Into<String>, apply: TransformFn) -> Self {
        FieldTransformation::Modify {
            field: field.into(),
            apply,
        }
    }

    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        FieldTransformation::Rename {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Applies the transformation in place. Non-object records are left
    /// untouched.
    pub fn apply(&self, record: &mut JsonValue) {
        match self {
            FieldTransformation::Add { field, value } => {
                let computed = match value {
                    AddValue::Static(value) => value.clone(),
                    AddValue::Computed(compute) => compute(record),
                };
                if let Some(map) = record.as_object_mut() {
                    map.insert(field.clone(), computed);
                }
            }
            FieldTransformation::Remove { field } => {
                if let Some(map) = record.as_object_mut() {
                    map.remove(field);
                }
            }
            FieldTransformation::Modify { field, apply } => {
                let current = record.get(field).cloned();
                if let (Some(current), Some(map)) = (current, record.as_object_mut()) {
                    map.insert(field.clone(), apply(&current));
                }
            }
            FieldTransformation::Rename { from, to } => {
                if let Some(map) = record.as_object_mut() {
                    if let Some(value) = map.remove(from) {
                        map.insert(to.clone(), value);
                    }
                }
            }
        }
    }
}

/// A declared migration between two adjacent versions.
#[derive(Clone, Debug)]
pub struct MigrationPath {
    pub from_version: String,
    pub to_version: String,
    pub transformations: Vec<FieldTransformation>,
    pub breaking: bool,
}

impl MigrationPath {
    /// Applies every transformation in order to a copy of `record`.
    pub fn apply(&self, record: &JsonValue) -> JsonValue {
        let mut migrated = record.clone();
        for transformation in &self.transformations {
            transformation.apply(&mut migrated);
        }
        migrated
    }
}

/// One version in the evolution chain.
#[derive(Clone, Debug)]
pub struct SchemaVersion {
    pub label: String,
    pub schema: SchemaNode,
    /// Human-readable breaking changes introduced *by* this version.
    pub breaking_changes: Vec<String>,
    pub deprecated_fields: Vec<String>,
    /// Outgoing migrations, usually one, to the next version.
    pub migrations: Vec<MigrationPath>,
}

/// One check outcome. `passed == false` is always a real defect;
/// expected incompatibilities are reported as passed with a detail.
#[derive(Clone, Debug, Serialize)]
pub struct EvolutionFinding {
    pub check: String,
    pub subject: String,
    pub passed: bool,
    pub detail: String,
}

impl EvolutionFinding {
    fn new(check: &str, subject: impl Into<String>, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            subject: subject.into(),
            passed,
            detail: detail.into(),
        }
    }
}

/// Aggregate of all evolution checks.
#[derive(Clone, Debug, Default, Serialize)]
pub struct EvolutionReport {
    pub findings: Vec<EvolutionFinding>,
    pub warnings: Vec<String>,
}

impl EvolutionReport {
    pub fn passed(&self) -> bool {
        self.findings.iter().all(|finding| finding.passed)
    }

    pub fn defects(&self) -> impl Iterator<Item = &EvolutionFinding> {
        self.findings.iter().filter(|finding| !finding.passed)
    }
}

/// Checker over an ordered version chain (oldest first).
pub struct EvolutionChecker {
    versions: Vec<SchemaVersion>,
    set: Arc<SchemaSet>,
    generator: GeneratorConfig,
}

impl EvolutionChecker {
    pub fn new(versions: Vec<SchemaVersion>) -> Self {
        Self {
            versions,
            set: Arc::new(SchemaSet::new()),
            generator: GeneratorConfig::default(),
        }
    }

    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    pub fn versions(&self) -> &[SchemaVersion] {
        &self.versions
    }

    /// Runs every check and merges the findings.
    pub fn check_all(&self) -> EvolutionReport {
        let mut report = EvolutionReport::default();
        report.findings.extend(self.check_versioning());
        let (compat, warnings) = self.check_backward_compatibility();
        report.findings.extend(compat);
        report.warnings.extend(warnings);
        report.findings.extend(self.check_migration_paths());
        report.findings.extend(self.check_breaking_detection());
        info!(
            "evolution checks: {} finding(s), {} defect(s)",
            report.findings.len(),
            report.defects().count()
        );
        report
    }

    /// Every version must validate its own generated canonical instance.
    pub fn check_versioning(&self) -> Vec<EvolutionFinding> {
        let mut findings = Vec::new();
        for version in &self.versions {
            match self.self_check(version) {
                Ok(()) => findings.push(EvolutionFinding::new(
                    "versioning",
                    &version.label,
                    true,
                    "schema validates its own generated instance",
                )),
                Err(detail) => {
                    findings.push(EvolutionFinding::new("versioning", &version.label, false, detail))
                }
            }
        }
        findings
    }

    /// Self-compatibility per version plus cross-version probes.
    ///
    /// Cross-version incompatibility is never a defect by itself: it is
    /// the expected outcome across a breaking migration, and a warning
    /// when no breaking migration explains it.
    pub fn check_backward_compatibility(&self) -> (Vec<EvolutionFinding>, Vec<String>) {
        let mut findings = Vec::new();
        let mut warnings = Vec::new();
        for version in &self.versions {
            let passed = self.self_check(version).is_ok();
            findings.push(EvolutionFinding::new(
                "backward-compatibility",
                &version.label,
                passed,
                if passed {
                    "self-compatible".to_string()
                } else {
                    "generated data fails its own schema".to_string()
                },
            ));
        }
        for earlier in 0..self.versions.len() {
            for later in earlier + 1..self.versions.len() {
                let from = &self.versions[earlier];
                let to = &self.versions[later];
                let compatible = self.cross_check(from, to);
                let breaking = self.breaking_between(earlier, later);
                let subject = format!("{} -> {}", from.label, to.label);
                let detail = match (compatible, breaking) {
                    (true, _) => "data remains valid".to_string(),
                    (false, true) => "incompatible across a declared breaking migration".to_string(),
                    (false, false) => {
                        let warning = format!(
                            "{subject}: data incompatible without a declared breaking migration"
                        );
                        warnings.push(warning.clone());
                        warning
                    }
                };
                findings.push(EvolutionFinding::new(
                    "backward-compatibility",
                    subject,
                    true,
                    detail,
                ));
            }
        }
        (findings, warnings)
    }

    /// Replays the migration chain from the oldest version, validating
    /// the migrated record against each target schema. A failure at a
    /// declared-breaking step counts as a pass of the check.
    pub fn check_migration_paths(&self) -> Vec<EvolutionFinding> {
        let mut findings = Vec::new();
        let Some(first) = self.versions.first() else {
            return findings;
        };
        let mut record = self.generate(first);
        for window in self.versions.windows(2) {
            let (from, to) = (&window[0], &window[1]);
            let subject = format!("{} -> {}", from.label, to.label);
            let Some(migration) = from
                .migrations
                .iter()
                .find(|migration| migration.to_version == to.label)
            else {
                findings.push(EvolutionFinding::new(
                    "migration-paths",
                    subject,
                    false,
                    "no declared migration to the next version",
                ));
                break;
            };
            record = migration.apply(&record);
            let valid = self.validates(&to.schema, &record);
            let (passed, detail) = match (valid, migration.breaking) {
                (true, _) => (true, "migrated data validates".to_string()),
                (false, true) => (true, "expected failure at breaking step".to_string()),
                (false, false) => (
                    false,
                    "migrated data fails a non-breaking step".to_string(),
                ),
            };
            findings.push(EvolutionFinding::new("migration-paths", subject, passed, detail));
        }
        findings
    }

    /// A migration's `breaking` flag must agree with the target version's
    /// declared breaking-change list.
    pub fn check_breaking_detection(&self) -> Vec<EvolutionFinding> {
        let mut findings = Vec::new();
        for version in &self.versions {
            for migration in &version.migrations {
                let subject = format!("{} -> {}", migration.from_version, migration.to_version);
                let declared = self
                    .versions
                    .iter()
                    .find(|candidate| candidate.label == migration.to_version)
                    .map(|candidate| !candidate.breaking_changes.is_empty())
                    .unwrap_or(false);
                let agrees = declared == migration.breaking;
                findings.push(EvolutionFinding::new(
                    "breaking-detection",
                    subject,
                    agrees,
                    if agrees {
                        "breaking flag agrees with declared changes".to_string()
                    } else {
                        format!(
                            "breaking flag is {} but declared breaking changes are {}",
                            migration.breaking,
                            if declared { "present" } else { "absent" }
                        )
                    },
                ));
            }
        }
        findings
    }

    /// Warning strings for deprecated fields present in `data`.
    pub fn deprecation_warnings(&self, version_label: &str, data: &JsonValue) -> Vec<String> {
        let Some(version) = self
            .versions
            .iter()
            .find(|version| version.label == version_label)
        else {
            return Vec::new();
        };
        version
            .deprecated_fields
            .iter()
            .filter(|field| data.get(field.as_str()).is_some())
            .map(|field| format!("field '{field}' is deprecated as of {version_label}"))
            .collect()
    }

    fn generate(&self, version: &SchemaVersion) -> JsonValue {
        DataGenerator::new(self.generator).generate(&version.schema, &self.set)
    }

    fn validates(&self, schema: &SchemaNode, data: &JsonValue) -> bool {
        match compile(schema, &self.set) {
            Ok(validator) => validator.check(data).is_valid(),
            Err(_) => false,
        }
    }

    fn self_check(&self, version: &SchemaVersion) -> Result<(), String> {
        let validator = compile(&version.schema, &self.set)
            .map_err(|error| format!("schema failed to compile: {error}"))?;
        let data = self.generate(version);
        let outcome = validator.check(&data);
        if outcome.is_valid() {
            Ok(())
        } else {
            Err(format!(
                "generated instance fails with {} error(s)",
                outcome.errors.len()
            ))
        }
    }

    fn cross_check(&self, from: &SchemaVersion, to: &SchemaVersion) -> bool {
        let data = self.generate(from);
        self.validates(&to.schema, &data)
    }

    fn breaking_between(&self, earlier: usize, later: usize) -> bool {
        self.versions[earlier..later]
            .iter()
            .zip(&self.versions[earlier + 1..=later])
            .any(|(from, to)| {
                from.migrations
                    .iter()
                    .any(|migration| migration.to_version == to.label && migration.breaking)
            })
    }
}

/// The built-in product version chain: v1.0.0 adds tags in v1.1.0
/// (non-breaking), v2.0.0 replaces `stockQuantity` with an `inventory`
/// object (breaking), v2.1.0 renames `description` to `summary` and
/// deprecates the old name.
pub fn product_version_chain() -> Vec<SchemaVersion> {
    let v1 = from_raw(&json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "format": "uuid" },
            "name": { "type": "string", "minLength": 1 },
            "description": { "type": "string" },
            "price": { "type": "number", "minimum": 0.01 },
            "stockQuantity": { "type": "integer", "minimum": 0 },
            "categoryId": { "type": "string", "format": "uuid" }
        },
        "required": ["id", "name", "price", "stockQuantity", "categoryId"]
    }));
    let v1_1 = from_raw(&json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "format": "uuid" },
            "name": { "type": "string", "minLength": 1 },
            "description": { "type": "string" },
            "price": { "type": "number", "minimum": 0.01 },
            "stockQuantity": { "type": "integer", "minimum": 0 },
            "categoryId": { "type": "string", "format": "uuid" },
            "tags": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["id", "name", "price", "stockQuantity", "categoryId"]
    }));
    let v2 = from_raw(&json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "format": "uuid" },
            "name": { "type": "string", "minLength": 1 },
            "description": { "type": "string" },
            "price": { "type": "number", "minimum": 0.01 },
            "inventory": {
                "type": "object",
                "properties": {
                    "available": { "type": "integer", "minimum": 0 },
                    "reserved": { "type": "integer", "minimum": 0 }
                },
                "required": ["available", "reserved"]
            },
            "categoryId": { "type": "string", "format": "uuid" },
            "tags": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["id", "name", "price", "inventory", "categoryId"]
    }));
    let v2_1 = from_raw(&json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "format": "uuid" },
            "name": { "type": "string", "minLength": 1 },
            "summary": { "type": "string" },
            "description": { "type": "string" },
            "price": { "type": "number", "minimum": 0.01 },
            "inventory": {
                "type": "object",
                "properties": {
                    "available": { "type": "integer", "minimum": 0 },
                    "reserved": { "type": "integer", "minimum": 0 }
                },
                "required": ["available", "reserved"]
            },
            "categoryId": { "type": "string", "format": "uuid" },
            "tags": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["id", "name", "price", "inventory", "categoryId"]
    }));

    let stock_to_inventory: TransformFn = Arc::new(|record| {
        let available = record
            .get("stockQuantity")
            .cloned()
            .unwrap_or_else(|| json!(0));
        json!({ "available": available, "reserved": 0 })
    });

    vec![
        SchemaVersion {
            label: "v1.0.0".to_string(),
            schema: v1,
            breaking_changes: Vec::new(),
            deprecated_fields: Vec::new(),
            migrations: vec![MigrationPath {
                from_version: "v1.0.0".to_string(),
                to_version: "v1.1.0".to_string(),
                transformations: vec![FieldTransformation::add("tags", json!([]))],
                breaking: false,
            }],
        },
        SchemaVersion {
            label: "v1.1.0".to_string(),
            schema: v1_1,
            breaking_changes: Vec::new(),
            deprecated_fields: Vec::new(),
            migrations: vec![MigrationPath {
                from_version: "v1.1.0".to_string(),
                to_version: "v2.0.0".to_string(),
                transformations: vec![
                    FieldTransformation::add_computed("inventory", stock_to_inventory),
                    FieldTransformation::remove("stockQuantity"),
                ],
                breaking: true,
            }],
        },
        SchemaVersion {
            label: "v2.0.0".to_string(),
            schema: v2,
            breaking_changes: vec![
                "stockQuantity replaced by the inventory object".to_string()
            ],
            deprecated_fields: Vec::new(),
            migrations: vec![MigrationPath {
                from_version: "v2.0.0".to_string(),
                to_version: "v2.1.0".to_string(),
                transformations: vec![FieldTransformation::rename("description", "summary")],
                breaking: false,
            }],
        },
        SchemaVersion {
            label: "v2.1.0".to_string(),
            schema: v2_1,
            breaking_changes: Vec::new(),
            deprecated_fields: vec!["description".to_string()],
            migrations: Vec::new(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> EvolutionChecker {
        EvolutionChecker::new(product_version_chain())
    }

    fn valid_v1_instance() -> JsonValue {
        json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "name": "Widget",
            "price": 9.99,
            "stockQuantity": 5,
            "categoryId": "550e8400-e29b-41d4-a716-446655440000"
        })
    }

    #[test]
    fn every_version_is_self_compatible() {
        let findings = checker().check_versioning();
        assert_eq!(findings.len(), 4);
        for finding in &findings {
            assert!(finding.passed, "{}: {}", finding.subject, finding.detail);
        }
    }

    #[test]
    fn non_breaking_migration_round_trips() {
        let versions = product_version_chain();
        let migration = &versions[0].migrations[0];
        let migrated = migration.apply(&valid_v1_instance());
        assert_eq!(migrated["tags"], json!([]));

        let checker = checker();
        let v1_1 = &checker.versions()[1];
        assert!(checker.validates(&v1_1.schema, &migrated));
    }

    #[test]
    fn breaking_flag_agrees_with_declared_changes() {
        let findings = checker().check_breaking_detection();
        assert_eq!(findings.len(), 3);
        for finding in &findings {
            assert!(finding.passed, "{}: {}", finding.subject, finding.detail);
        }
    }

    #[test]
    fn mismatched_breaking_flag_is_a_defect() {
        let mut versions = product_version_chain();
        // Declare the v1.1.0 migration non-breaking while v2.0.0 still
        // lists a breaking change.
        versions[1].migrations[0].breaking = false;
        let findings = EvolutionChecker::new(versions).check_breaking_detection();
        assert!(findings.iter().any(|finding| !finding.passed));
    }

    #[test]
    fn migration_chain_replays_end_to_end() {
        let findings = checker().check_migration_paths();
        assert_eq!(findings.len(), 3);
        for finding in &findings {
            assert!(finding.passed, "{}: {}", finding.subject, finding.detail);
        }
    }

    #[test]
    fn incompatibility_across_breaking_step_is_expected() {
        let (findings, warnings) = checker().check_backward_compatibility();
        let cross = findings
            .iter()
            .find(|finding| finding.subject == "v1.1.0 -> v2.0.0")
            .expect("cross finding");
        assert!(cross.passed);
        assert!(cross.detail.contains("breaking"));
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn check_all_passes_on_the_builtin_chain() {
        let report = checker().check_all();
        assert!(report.passed(), "defects: {:?}", report.defects().collect::<Vec<_>>());
    }

    #[test]
    fn deprecated_field_surfaces_a_warning() {
        let checker = checker();
        let data = json!({ "description": "old text" });
        let warnings = checker.deprecation_warnings("v2.1.0", &data);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("description"));
        assert!(checker
            .deprecation_warnings("v2.1.0", &json!({ "summary": "new" }))
            .is_empty());
    }

    #[test]
    fn rename_is_a_no_op_when_the_source_field_is_absent() {
        let mut record = json!({ "name": "x" });
        FieldTransformation::rename("description", "summary").apply(&mut record);
        assert_eq!(record, json!({ "name": "x" }));
    }

    #[test]
    fn add_computed_sees_the_whole_source_record() {
        let mut record = json!({ "stockQuantity": 7 });
        let compute: TransformFn = Arc::new(|record| {
            json!({ "available": record["stockQuantity"], "reserved": 0 })
        });
        FieldTransformation::add_computed("inventory", compute).apply(&mut record);
        assert_eq!(record["inventory"], json!({ "available": 7, "reserved": 0 }));
    }

    #[test]
    fn modify_replaces_the_field_value() {
        let mut record = json!({ "price": 10.0 });
        let double: TransformFn = Arc::new(|value| {
            json!(value.as_f64().unwrap_or(0.0) * 2.0)
        });
        FieldTransformation::modify("price", double).apply(&mut record);
        assert_eq!(record["price"], json!(20.0));
    }
}
