//! Runtime contract validation service.
//!
//! Wraps the discovered [`EndpointSchemaMap`] behind a request/response
//! validation API. Failed validations are recorded as immutable
//! [`ContractViolation`]s in an append-only, mutex-guarded log that is
//! cleared explicitly between runs. In CI the service fails hard on the
//! first violation; elsewhere it logs and returns the failure to the
//! caller.

use std::env;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::registry::EndpointSchemaMap;
use crate::spec::Method;
use crate::validator::ValidationIssue;

/// Whether a violation concerns the request or the response payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Request,
    Response,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Request => f.write_str("request"),
            Direction::Response => f.write_str("response"),
        }
    }
}

/// Violation severity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// A recorded contract mismatch. Immutable once created; lives until the
/// caller resets the service between runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractViolation {
    pub endpoint: String,
    pub method: Method,
    pub direction: Direction,
    pub errors: Vec<ValidationIssue>,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
}

/// Result of a single validation call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckResult {
    pub success: bool,
    pub errors: Vec<ValidationIssue>,
}

impl CheckResult {
    fn pass() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }
}

/// Errors raised by the validation service itself (as opposed to
/// validation failures, which are result values).
#[derive(Debug)]
pub enum ContractError {
    /// `validate_*` was called before `initialize()`.
    NotInitialized,
    /// A violation occurred while running in CI mode; the run must stop.
    CiViolation(Box<ContractViolation>),
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractError::NotInitialized => {
                f.write_str("contract service used before initialize()")
            }
            ContractError::CiViolation(violation) => write!(
                f,
                "contract violation in CI: {} {} {} ({} errors)",
                violation.method,
                violation.endpoint,
                violation.direction,
                violation.errors.len()
            ),
        }
    }
}

impl std::error::Error for ContractError {}

/// The contract validation service.
///
/// State machine: `Uninitialized → Initialized`, one-way via a successful
/// [`ContractService::initialize`]. All `validate_*` calls are only legal
/// once initialized.
#[derive(Debug)]
pub struct ContractService {
    map: EndpointSchemaMap,
    ci_mode: bool,
    initialized: bool,
    violations: Mutex<Vec<ContractViolation>>,
}

impl ContractService {
    /// Creates a service over a discovered endpoint map. CI mode defaults
    /// from the `CI` environment variable.
    pub fn new(map: EndpointSchemaMap) -> Self {
        Self {
            map,
            ci_mode: env::var("CI").is_ok(),
            initialized: false,
            violations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_ci_mode(mut self, ci_mode: bool) -> Self {
        self.ci_mode = ci_mode;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn map(&self) -> &EndpointSchemaMap {
        &self.map
    }

    /// Moves the service into the `Initialized` state. Idempotent.
    pub fn initialize(&mut self) {
        self.initialized = true;
    }

    /// Validates a request payload against the registered contract.
    pub fn validate_request(
        &self,
        endpoint: &str,
        method: Method,
        data: &JsonValue,
    ) -> Result<CheckResult, ContractError> {
        self.validate(endpoint, method, Direction::Request, data)
    }

    /// Validates a response payload against the registered contract.
    pub fn validate_response(
        &self,
        endpoint: &str,
        method: Method,
        data: &JsonValue,
    ) -> Result<CheckResult, ContractError> {
        self.validate(endpoint, method, Direction::Response, data)
    }

    fn validate(
        &self,
        endpoint: &str,
        method: Method,
        direction: Direction,
        data: &JsonValue,
    ) -> Result<CheckResult, ContractError> {
        if !self.initialized {
            return Err(ContractError::NotInitialized);
        }

        let Some(entry) = self.map.match_endpoint(endpoint, method) else {
            // No contract to enforce; degrade gracefully.
            return Ok(CheckResult::pass());
        };
        let validator = match direction {
            Direction::Request => entry.request.as_ref(),
            Direction::Response => entry.response.as_ref(),
        };
        let Some(validator) = validator else {
            return Ok(CheckResult::pass());
        };

        let outcome = validator.check(data);
        if outcome.is_valid() {
            return Ok(CheckResult::pass());
        }

        let violation = ContractViolation {
            endpoint: endpoint.to_string(),
            method,
            direction,
            errors: outcome.errors.clone(),
            timestamp: Utc::now(),
            severity: Severity::Error,
        };
        error!(
            "contract violation: {} {} {} — {} error(s)",
            method,
            endpoint,
            direction,
            violation.errors.len()
        );
        self.record(violation.clone());

        if self.ci_mode {
            return Err(ContractError::CiViolation(Box::new(violation)));
        }
        Ok(CheckResult {
            success: false,
            errors: outcome.errors,
        })
    }

    fn record(&self, violation: ContractViolation) {
        // Poisoning only happens if a holder panicked; keep the log usable.
        let mut violations = match self.violations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        violations.push(violation);
    }

    /// Snapshot of the recorded violations.
    pub fn violations(&self) -> Vec<ContractViolation> {
        match self.violations.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Clears the violation log between runs.
    pub fn reset(&self) {
        let mut violations = match self.violations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        violations.clear();
    }
}
