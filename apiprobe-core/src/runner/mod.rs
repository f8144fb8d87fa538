//! Dynamic contract test runner.
//!
//! Orchestrates a full run: load the spec, discover the endpoint map,
//! generate request data, patch in real foreign keys, issue HTTP calls,
//! validate responses through the contract service, and report totals
//! plus endpoint/schema coverage.

mod coverage;
mod execution;
mod fixtures;
mod result;

pub use coverage::{CoverageReport, CoverageSection, CoverageTracker};
pub use execution::{run_contract_suite, run_from_spec_path, RunError, RunnerConfig};
pub use fixtures::ReferencePatcher;
pub use result::{EndpointTestResult, RunSummary, TestStep, TraceEntry};
