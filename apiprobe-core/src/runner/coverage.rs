//! Endpoint and schema coverage accounting.
//!
//! Process-wide per run: reset at the start, reported at the end. Used
//! only for reporting, never to gate pass/fail.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::registry::EndpointSchemaMap;
use crate::schema::SchemaSet;

/// Coverage over one dimension (endpoints or schemas).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CoverageSection {
    pub total: usize,
    pub tested: usize,
    pub percent: f64,
    pub tested_list: Vec<String>,
    pub untested_list: Vec<String>,
}

/// Coverage report for a completed run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CoverageReport {
    pub endpoints: CoverageSection,
    pub schemas: CoverageSection,
}

/// Tracks which endpoints and schemas a run exercised.
#[derive(Clone, Debug, Default)]
pub struct CoverageTracker {
    all_endpoints: BTreeSet<String>,
    tested_endpoints: BTreeSet<String>,
    all_schemas: BTreeSet<String>,
    tested_schemas: BTreeSet<String>,
}

impl CoverageTracker {
    /// Seeds the universe from the discovered map and schema arena.
    pub fn new(map: &EndpointSchemaMap, schemas: &SchemaSet) -> Self {
        Self {
            all_endpoints: map.entries().iter().map(|entry| entry.key()).collect(),
            tested_endpoints: BTreeSet::new(),
            all_schemas: schemas.names().cloned().collect(),
            tested_schemas: BTreeSet::new(),
        }
    }

    pub fn mark_endpoint(&mut self, key: impl Into<String>) {
        self.tested_endpoints.insert(key.into());
    }

    pub fn mark_schemas<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.tested_schemas.insert(name.into());
        }
    }

    pub fn report(&self) -> CoverageReport {
        CoverageReport {
            endpoints: section(&self.all_endpoints, &self.tested_endpoints),
            schemas: section(&self.all_schemas, &self.tested_schemas),
        }
    }
}

fn section(all: &BTreeSet<String>, tested: &BTreeSet<String>) -> CoverageSection {
    let tested_list: Vec<String> = all.intersection(tested).cloned().collect();
    let untested_list: Vec<String> = all.difference(tested).cloned().collect();
    let total = all.len();
    let percent = if total == 0 {
        100.0
    } else {
        (tested_list.len() as f64 / total as f64) * 100.0
    };
    CoverageSection {
        total,
        tested: tested_list.len(),
        percent,
        tested_list,
        untested_list,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::discover;
    use crate::spec;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn report_counts_tested_and_untested() {
        let document = spec::from_value(&json!({
            "paths": {},
            "components": {
                "schemas": {
                    "Product": { "type": "object" },
                    "Category": { "type": "object" }
                }
            }
        }))
        .expect("document");
        let set = Arc::new(document.schemas.clone());
        let map = discover(&document, &set);
        let total_endpoints = map.len();

        let mut tracker = CoverageTracker::new(&map, &document.schemas);
        tracker.mark_endpoint("GET /api/products");
        tracker.mark_endpoint("POST /api/products");
        tracker.mark_schemas(["Product"]);

        let report = tracker.report();
        assert_eq!(report.endpoints.total, total_endpoints);
        assert_eq!(report.endpoints.tested, 2);
        assert_eq!(
            report.endpoints.untested_list.len(),
            total_endpoints - 2
        );
        assert_eq!(report.schemas.total, 2);
        assert_eq!(report.schemas.tested, 1);
        assert_eq!(report.schemas.untested_list, vec!["Category".to_string()]);
    }

    #[test]
    fn empty_universe_reports_full_coverage() {
        let tracker = CoverageTracker::default();
        let report = tracker.report();
        assert_eq!(report.endpoints.percent, 100.0);
        assert_eq!(report.schemas.percent, 100.0);
    }

    #[test]
    fn marks_outside_the_universe_are_ignored_in_percentages() {
        let mut tracker = CoverageTracker::default();
        tracker.mark_endpoint("GET /api/surprise");
        let report = tracker.report();
        assert_eq!(report.endpoints.tested, 0);
    }
}
