//! Per-endpoint and per-run result records.

use serde::{Deserialize, Serialize};

use crate::client::ApiRequest;
use crate::contract::ContractViolation;
use crate::runner::coverage::CoverageReport;
use crate::spec::Method;

/// The concrete exchange behind one endpoint test.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceEntry {
    /// The request that was sent.
    pub request: ApiRequest,
    /// Raw response body text; `None` records a transport failure.
    pub response: Option<String>,
}

/// One named check inside an endpoint test.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestStep {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl TestStep {
    pub(crate) fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: detail.into(),
        }
    }

    pub(crate) fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Outcome of exercising one endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointTestResult {
    /// Registered path pattern.
    pub pattern: String,
    /// Concrete path the request was sent to.
    pub path: String,
    pub method: Method,
    /// HTTP status of the response; 0 records a transport failure.
    pub status: u16,
    pub elapsed_ms: u64,
    pub passed: bool,
    pub steps: Vec<TestStep>,
    /// Request/response exchange; dropped from output unless requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceEntry>,
}

impl EndpointTestResult {
    pub fn failed_steps(&self) -> impl Iterator<Item = &TestStep> {
        self.steps.iter().filter(|step| !step.passed)
    }
}

/// Aggregate outcome of a full run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<EndpointTestResult>,
    pub coverage: CoverageReport,
    pub violations: Vec<ContractViolation>,
    /// Discovery warnings (schemas that failed to compile).
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &EndpointTestResult> {
        self.results.iter().filter(|result| !result.passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_steps_filters_passing_ones() {
        let result = EndpointTestResult {
            pattern: "/api/products".to_string(),
            path: "/api/products".to_string(),
            method: Method::Get,
            status: 200,
            elapsed_ms: 3,
            passed: false,
            steps: vec![
                TestStep::pass("status code", "200 expected"),
                TestStep::fail("response schema", "1 error"),
            ],
            trace: None,
        };
        let failed: Vec<_> = result.failed_steps().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "response schema");
    }

    #[test]
    fn trace_is_omitted_from_json_until_requested() {
        let mut result = EndpointTestResult {
            pattern: "/api/products".to_string(),
            path: "/api/products".to_string(),
            method: Method::Get,
            status: 200,
            elapsed_ms: 3,
            passed: true,
            steps: Vec::new(),
            trace: None,
        };
        let encoded = serde_json::to_value(&result).expect("encode");
        assert!(encoded.get("trace").is_none());

        result.trace = Some(TraceEntry {
            request: ApiRequest::new(Method::Get, "/api/products"),
            response: Some("[]".to_string()),
        });
        let encoded = serde_json::to_value(&result).expect("encode");
        assert_eq!(encoded["trace"]["request"]["path"], "/api/products");
        assert_eq!(encoded["trace"]["response"], "[]");
    }

    #[test]
    fn summary_round_trips_through_json() {
        let summary = RunSummary {
            total: 1,
            passed: 1,
            failed: 0,
            results: Vec::new(),
            coverage: CoverageReport::default(),
            violations: Vec::new(),
            warnings: Vec::new(),
        };
        let encoded = serde_json::to_string(&summary).expect("encode");
        let decoded: RunSummary = serde_json::from_str(&encoded).expect("decode");
        assert!(decoded.all_passed());
        assert_eq!(decoded.total, 1);
    }
}
