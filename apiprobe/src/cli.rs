use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "apiprobe", version, about = "Schema-driven API contract tester")]
pub struct Cli {
    /// Emit JSON output instead of human-readable output.
    #[arg(long)]
    pub json: bool,
    /// RNG seed for test-data generation.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    /// Probability that an optional field appears in generated data.
    #[arg(long, default_value_t = 0.7)]
    pub optional_field_probability: f64,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full contract suite against a backend.
    Run {
        /// Path to the specification document (JSON).
        #[arg(long)]
        spec: String,
        /// Base URL of the backend under test.
        #[arg(long)]
        base_url: String,
        /// Fail hard on the first contract violation (defaults from $CI).
        #[arg(long)]
        ci: bool,
        /// Endpoint patterns or "METHOD pattern" keys to include (repeatable).
        #[arg(long = "endpoint-allowlist")]
        endpoint_allowlist: Vec<String>,
        /// Endpoint patterns or "METHOD pattern" keys to skip (repeatable).
        #[arg(long = "endpoint-blocklist")]
        endpoint_blocklist: Vec<String>,
        /// Id substituted into wildcard path segments.
        #[arg(long)]
        placeholder_id: Option<String>,
        /// Include each request and raw response in the output.
        #[arg(long)]
        full_trace: bool,
        /// Per-request timeout in seconds.
        #[arg(long, default_value_t = 30)]
        timeout_seconds: u64,
    },
    /// Load-test one endpoint while validating every response.
    Load {
        /// Path to the specification document (JSON).
        #[arg(long)]
        spec: String,
        /// Base URL of the backend under test.
        #[arg(long)]
        base_url: String,
        /// Endpoint path to hammer.
        #[arg(long)]
        endpoint: String,
        /// HTTP method.
        #[arg(long, default_value = "GET")]
        method: String,
        /// Concurrent workers (stress mode treats this as the cap).
        #[arg(long, default_value_t = 10)]
        concurrency: usize,
        /// Test duration in milliseconds.
        #[arg(long, default_value_t = 10_000)]
        duration_ms: u64,
        /// Walk increasing concurrency steps instead of a single run.
        #[arg(long)]
        stress: bool,
        /// Per-request timeout in seconds.
        #[arg(long, default_value_t = 30)]
        timeout_seconds: u64,
    },
    /// Check the built-in schema version chain for compatibility defects.
    Evolution,
    /// Serve the mock e-commerce backend until interrupted.
    ServeMock,
}
