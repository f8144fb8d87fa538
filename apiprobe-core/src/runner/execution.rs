//! Contract suite execution.
//!
//! Drives every registered endpoint once: generate a request body where
//! the contract declares one, patch foreign keys, send, then check the
//! status code and validate both directions through the contract
//! service. A single endpoint failure never aborts the run; only a CI
//! violation does.

use std::env;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};

use crate::client::{ApiClient, ApiRequest};
use crate::contract::{ContractError, ContractService};
use crate::generator::{DataGenerator, GeneratorConfig, PLACEHOLDER_UUID};
use crate::registry::{discover, substitute_wildcard, EndpointEntry};
use crate::runner::coverage::CoverageTracker;
use crate::runner::fixtures::ReferencePatcher;
use crate::runner::result::{EndpointTestResult, RunSummary, TestStep, TraceEntry};
use crate::spec::{self, Method, SpecDocument, SpecLoadError};

/// Knobs for a contract run.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Fail hard on the first contract violation. Defaults from `CI`.
    pub ci_mode: bool,
    pub generator: GeneratorConfig,
    /// Id substituted into `{wildcard}` path segments.
    pub placeholder_id: String,
    /// Patterns (or "METHOD pattern" keys) to run; empty means all.
    pub allowlist: Vec<String>,
    /// Patterns (or "METHOD pattern" keys) to skip.
    pub blocklist: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ci_mode: env::var("CI").is_ok(),
            generator: GeneratorConfig::default(),
            placeholder_id: PLACEHOLDER_UUID.to_string(),
            allowlist: Vec::new(),
            blocklist: Vec::new(),
        }
    }
}

impl RunnerConfig {
    pub fn with_ci_mode(mut self, ci_mode: bool) -> Self {
        self.ci_mode = ci_mode;
        self
    }

    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_allowlist(mut self, allowlist: Vec<String>) -> Self {
        self.allowlist = allowlist;
        self
    }

    pub fn with_blocklist(mut self, blocklist: Vec<String>) -> Self {
        self.blocklist = blocklist;
        self
    }
}

/// Errors that can end a run before it produces a summary.
#[derive(Debug)]
pub enum RunError {
    Spec(SpecLoadError),
    Contract(ContractError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Spec(error) => write!(f, "{error}"),
            RunError::Contract(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<SpecLoadError> for RunError {
    fn from(error: SpecLoadError) -> Self {
        RunError::Spec(error)
    }
}

impl From<ContractError> for RunError {
    fn from(error: ContractError) -> Self {
        RunError::Contract(error)
    }
}

/// Loads a spec file and runs the full contract suite against it.
pub async fn run_from_spec_path(
    client: &dyn ApiClient,
    spec_path: impl AsRef<Path>,
    config: &RunnerConfig,
) -> Result<RunSummary, RunError> {
    let document = spec::load(spec_path)?;
    Ok(run_contract_suite(client, &document, config).await?)
}

/// Runs the contract suite over every selected endpoint of a loaded
/// document.
///
/// Endpoint failures are recorded and the run continues; the only early
/// exit is [`ContractError::CiViolation`] in CI mode.
pub async fn run_contract_suite(
    client: &dyn ApiClient,
    document: &SpecDocument,
    config: &RunnerConfig,
) -> Result<RunSummary, ContractError> {
    let set = Arc::new(document.schemas.clone());
    let map = discover(document, &set);
    let mut tracker = CoverageTracker::new(&map, &document.schemas);
    let warnings = map.warnings.clone();

    let mut service = ContractService::new(map).with_ci_mode(config.ci_mode);
    service.initialize();
    service.reset();

    let mut generator = DataGenerator::new(config.generator.clone());
    let mut patcher = ReferencePatcher::new();
    let mut results = Vec::new();

    for entry in service.map().entries() {
        if !selected(entry, config) {
            continue;
        }
        tracker.mark_endpoint(entry.key());
        tracker.mark_schemas(entry.schema_names.iter().cloned());

        let path = substitute_wildcard(&entry.pattern, &config.placeholder_id);
        info!("probing {} {}", entry.method, path);

        let mut steps = Vec::new();
        let body = match build_body(entry, &set, &mut generator, &mut patcher, client).await {
            Some(body) => {
                debug!("generated body for {} {}: {}", entry.method, path, body);
                let check = service.validate_request(&path, entry.method, &body)?;
                steps.push(if check.success {
                    TestStep::pass("request schema", "generated body conforms")
                } else {
                    TestStep::fail(
                        "request schema",
                        format!("{} error(s) in generated body", check.errors.len()),
                    )
                });
                Some(body)
            }
            None => None,
        };

        let mut request = ApiRequest::new(entry.method, &path);
        if let Some(body) = body {
            request = request.with_body(body);
        }

        let sent = request.clone();
        let response = match client.send(request).await {
            Ok(response) => response,
            Err(error) => {
                steps.push(TestStep::fail("http request", error.to_string()));
                results.push(EndpointTestResult {
                    pattern: entry.pattern.clone(),
                    path,
                    method: entry.method,
                    status: 0,
                    elapsed_ms: 0,
                    passed: false,
                    steps,
                    trace: Some(TraceEntry {
                        request: sent,
                        response: None,
                    }),
                });
                continue;
            }
        };

        let elapsed_ms = response.elapsed.as_millis() as u64;
        steps.push(TestStep::pass(
            "http request",
            format!("{} in {}ms", response.status, elapsed_ms),
        ));

        if response.body_text.trim().is_empty() {
            steps.push(TestStep::pass("response body", "empty body"));
        } else if response.json.is_some() {
            steps.push(TestStep::pass("response body", "parsed as JSON"));
        } else {
            steps.push(TestStep::fail("response body", "body is not valid JSON"));
        }

        let expected = expected_statuses(entry);
        steps.push(if expected.contains(&response.status) {
            TestStep::pass("status code", format!("{} is expected", response.status))
        } else {
            TestStep::fail(
                "status code",
                format!("{} not in expected {:?}", response.status, expected),
            )
        });

        if response.is_success() && entry.response.is_some() {
            if let Some(json) = &response.json {
                let check = service.validate_response(&path, entry.method, json)?;
                steps.push(if check.success {
                    TestStep::pass("response schema", "response conforms")
                } else {
                    TestStep::fail(
                        "response schema",
                        format!("{} error(s)", check.errors.len()),
                    )
                });
            }
        }

        let passed = steps.iter().all(|step| step.passed);
        results.push(EndpointTestResult {
            pattern: entry.pattern.clone(),
            path,
            method: entry.method,
            status: response.status,
            elapsed_ms,
            passed,
            steps,
            trace: Some(TraceEntry {
                request: sent,
                response: Some(response.body_text),
            }),
        });
    }

    let passed = results.iter().filter(|result| result.passed).count();
    let failed = results.len() - passed;
    Ok(RunSummary {
        total: results.len(),
        passed,
        failed,
        results,
        coverage: tracker.report(),
        violations: service.violations(),
        warnings,
    })
}

fn selected(entry: &EndpointEntry, config: &RunnerConfig) -> bool {
    let key = entry.key();
    if !config.allowlist.is_empty()
        && !config
            .allowlist
            .iter()
            .any(|item| item == &entry.pattern || item == &key)
    {
        return false;
    }
    !config
        .blocklist
        .iter()
        .any(|item| item == &entry.pattern || item == &key)
}

/// Declared 2xx statuses widened with the conventional codes per method,
/// so a spec that says 200 does not flag a backend answering 201.
fn expected_statuses(entry: &EndpointEntry) -> Vec<u16> {
    let mut expected = entry.success_statuses.clone();
    let conventional: &[u16] = match entry.method {
        Method::Get => &[200],
        Method::Post => &[200, 201],
        Method::Put => &[200, 204],
        Method::Delete => &[200, 204],
        Method::Patch => &[200],
    };
    for status in conventional {
        if !expected.contains(status) {
            expected.push(*status);
        }
    }
    expected
}

async fn build_body(
    entry: &EndpointEntry,
    set: &Arc<crate::schema::SchemaSet>,
    generator: &mut DataGenerator,
    patcher: &mut ReferencePatcher,
    client: &dyn ApiClient,
) -> Option<serde_json::Value> {
    if !matches!(entry.method, Method::Post | Method::Put | Method::Patch) {
        return None;
    }
    let validator = entry.request.as_ref()?;
    let mut body = generator.generate(validator.schema(), set);
    patcher.patch(client, &mut body).await;
    Some(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_clients::{json_response, text_response, QueueClient};
    use crate::client::TransportError;
    use serde_json::json;

    fn empty_document() -> SpecDocument {
        spec::from_value(&json!({ "paths": {} })).expect("empty document")
    }

    fn product_document() -> SpecDocument {
        spec::from_value(&json!({
            "paths": {
                "/api/products": {
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
                    }
                }
            }
        }))
        .expect("product document")
    }

    fn config() -> RunnerConfig {
        RunnerConfig::default().with_ci_mode(false)
    }

    #[tokio::test]
    async fn passing_endpoint_is_counted_and_covered() {
        let client =
            QueueClient::new(vec![Ok(json_response(200, json!([])))]);
        let summary = run_contract_suite(
            &client,
            &empty_document(),
            &config().with_allowlist(vec!["GET /api/products".to_string()]),
        )
        .await
        .expect("run");

        assert_eq!(summary.total, 1);
        assert_eq!(summary.passed, 1);
        assert!(summary.all_passed());
        assert_eq!(summary.coverage.endpoints.tested, 1);
        assert!(summary
            .coverage
            .endpoints
            .tested_list
            .contains(&"GET /api/products".to_string()));
    }

    #[tokio::test]
    async fn transport_failure_records_status_zero_and_continues() {
        let client = QueueClient::new(vec![
            Err(TransportError::new("connection refused")),
            Ok(json_response(200, json!([]))),
        ]);
        let summary = run_contract_suite(
            &client,
            &empty_document(),
            &config().with_allowlist(vec![
                "GET /api/products".to_string(),
                "GET /api/categories".to_string(),
            ]),
        )
        .await
        .expect("run");

        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed, 1);
        let failure = summary.failures().next().expect("one failure");
        assert_eq!(failure.status, 0);
    }

    #[tokio::test]
    async fn unexpected_status_fails_the_endpoint() {
        let client = QueueClient::new(vec![Ok(json_response(500, json!({ "error": "boom" })))]);
        let summary = run_contract_suite(
            &client,
            &empty_document(),
            &config().with_allowlist(vec!["GET /api/products".to_string()]),
        )
        .await
        .expect("run");

        assert_eq!(summary.failed, 1);
        let failure = summary.failures().next().expect("failure");
        assert!(failure
            .failed_steps()
            .any(|step| step.name == "status code"));
    }

    #[tokio::test]
    async fn response_schema_violation_is_recorded_outside_ci() {
        // Missing required "name".
        let client = QueueClient::new(vec![Ok(json_response(
            200,
            json!({ "id": "550e8400-e29b-41d4-a716-446655440000" }),
        ))]);
        let summary = run_contract_suite(
            &client,
            &product_document(),
            &config().with_allowlist(vec!["GET /api/products".to_string()]),
        )
        .await
        .expect("run");

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.violations.len(), 1);
        assert_eq!(summary.violations[0].endpoint, "/api/products");
    }

    #[tokio::test]
    async fn ci_mode_halts_on_response_violation() {
        let client = QueueClient::new(vec![Ok(json_response(
            200,
            json!({ "id": "550e8400-e29b-41d4-a716-446655440000" }),
        ))]);
        let error = run_contract_suite(
            &client,
            &product_document(),
            &config()
                .with_ci_mode(true)
                .with_allowlist(vec!["GET /api/products".to_string()]),
        )
        .await
        .expect_err("ci halt");

        assert!(matches!(error, ContractError::CiViolation(_)));
    }

    #[tokio::test]
    async fn post_generates_a_conforming_body() {
        let client = QueueClient::new(vec![Ok(json_response(
            201,
            json!({ "id": "c-1", "name": "Electronics" }),
        ))]);
        let summary = run_contract_suite(
            &client,
            &empty_document(),
            &config().with_allowlist(vec!["POST /api/categories".to_string()]),
        )
        .await
        .expect("run");

        assert!(summary.all_passed());
        let requests = client.requests.lock().expect("requests");
        assert_eq!(requests.len(), 1);
        let body = requests[0].body.as_ref().expect("generated body");
        assert!(body["name"].as_str().map_or(false, |name| !name.is_empty()));
    }

    #[tokio::test]
    async fn wildcard_paths_use_the_placeholder_id() {
        let client = QueueClient::new(vec![Ok(text_response(204, ""))]);
        let summary = run_contract_suite(
            &client,
            &empty_document(),
            &config().with_allowlist(vec!["DELETE /api/salespersons/{id}".to_string()]),
        )
        .await
        .expect("run");

        assert!(summary.all_passed());
        let requests = client.requests.lock().expect("requests");
        assert_eq!(
            requests[0].path,
            format!("/api/salespersons/{PLACEHOLDER_UUID}")
        );
    }

    #[tokio::test]
    async fn every_result_carries_the_request_and_raw_response() {
        let client = QueueClient::new(vec![Ok(json_response(200, json!([])))]);
        let summary = run_contract_suite(
            &client,
            &empty_document(),
            &config().with_allowlist(vec!["GET /api/products".to_string()]),
        )
        .await
        .expect("run");

        let trace = summary.results[0].trace.as_ref().expect("trace");
        assert_eq!(trace.request.method, Method::Get);
        assert_eq!(trace.request.path, "/api/products");
        assert!(trace.request.body.is_none());
        assert_eq!(trace.response.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn transport_failure_traces_the_request_without_a_response() {
        let client = QueueClient::new(vec![Err(TransportError::new("connection refused"))]);
        let summary = run_contract_suite(
            &client,
            &empty_document(),
            &config().with_allowlist(vec!["GET /api/products".to_string()]),
        )
        .await
        .expect("run");

        let trace = summary.results[0].trace.as_ref().expect("trace");
        assert_eq!(trace.request.path, "/api/products");
        assert!(trace.response.is_none());
    }

    #[tokio::test]
    async fn blocklist_skips_endpoints() {
        let client = QueueClient::new(vec![Ok(json_response(200, json!([])))]);
        let summary = run_contract_suite(
            &client,
            &empty_document(),
            &config()
                .with_allowlist(vec![
                    "GET /api/products".to_string(),
                    "GET /api/categories".to_string(),
                ])
                .with_blocklist(vec!["GET /api/categories".to_string()]),
        )
        .await
        .expect("run");

        assert_eq!(summary.total, 1);
    }

    #[tokio::test]
    async fn run_from_spec_path_reports_missing_file() {
        let client = QueueClient::new(vec![]);
        let error = run_from_spec_path(&client, "/nonexistent/spec.json", &config())
            .await
            .expect_err("missing file");
        assert!(matches!(error, RunError::Spec(SpecLoadError::Unreadable { .. })));
    }
}
