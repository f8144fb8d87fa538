//! Schema-driven API contract testing engine.
//!
//! Loads an OpenAPI-like specification, compiles its schemas into
//! validators, generates conforming (and deliberately corrupted) test
//! data, and drives a live HTTP backend: every response is checked
//! against its declared contract, violations are recorded, and runs
//! report pass/fail totals plus endpoint and schema coverage. Evolution
//! and load drivers reuse the same validation service.

pub mod client;
pub mod contract;
pub mod evolution;
pub mod generator;
pub mod load;
pub mod registry;
pub mod runner;
pub mod schema;
pub mod spec;
pub mod validator;

pub use client::{ApiClient, ApiRequest, ApiResponse, HttpApiClient, TransportError};
pub use contract::{
    CheckResult, ContractError, ContractService, ContractViolation, Direction, Severity,
};
pub use evolution::{
    product_version_chain, EvolutionChecker, EvolutionFinding, EvolutionReport,
    FieldTransformation, MigrationPath, SchemaVersion,
};
pub use generator::{CorruptedCase, DataGenerator, GeneratorConfig, PLACEHOLDER_UUID};
pub use load::{run_load_test, run_stress_test, LoadTestConfig, LoadTestReport};
pub use registry::{discover, EndpointEntry, EndpointSchemaMap};
pub use runner::{
    run_contract_suite, run_from_spec_path, CoverageReport, EndpointTestResult, RunError,
    RunSummary, RunnerConfig, TestStep, TraceEntry,
};
pub use schema::{resolve, SchemaNode, SchemaResolutionError, SchemaSet};
pub use spec::{load, Method, OperationSpec, SpecDocument, SpecLoadError};
pub use validator::{compile, CompiledValidator, ValidationIssue, ValidationOutcome};
