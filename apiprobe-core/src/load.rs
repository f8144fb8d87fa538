//! Load and stress test drivers.
//!
//! Workers are independent tasks that own their sample buffers; buffers
//! are merged only after every worker has completed, so no locking is
//! needed around the hot loop. Response validation reuses the contract
//! service, and a validation failure counts against the error rate just
//! like a transport failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::info;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::client::{ApiClient, ApiRequest};
use crate::contract::ContractService;
use crate::spec::Method;

/// Concurrency steps a stress test walks through.
const STRESS_STEPS: [usize; 7] = [1, 5, 10, 25, 50, 75, 100];
/// A stress test stops once a step's error rate exceeds this.
const STRESS_ERROR_RATE_LIMIT: f64 = 0.5;

/// Parameters for one load test.
#[derive(Clone, Debug)]
pub struct LoadTestConfig {
    pub endpoint: String,
    pub method: Method,
    pub concurrency: usize,
    pub duration: Duration,
    pub body: Option<JsonValue>,
    /// Fixed pause between iterations of each worker.
    pub delay: Duration,
}

impl LoadTestConfig {
    pub fn new(endpoint: impl Into<String>, method: Method) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            concurrency: 1,
            duration: Duration::from_secs(1),
            body: None,
            delay: Duration::from_millis(1),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Aggregated outcome of one load test.
#[derive(Clone, Debug, Serialize)]
pub struct LoadTestReport {
    pub endpoint: String,
    pub method: Method,
    pub concurrency: usize,
    pub duration_ms: u64,
    pub total_requests: usize,
    pub failed_requests: usize,
    pub error_rate: f64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    /// Requests per second over the configured duration.
    pub throughput: f64,
}

struct Sample {
    elapsed_ms: f64,
    failed: bool,
}

/// Runs `concurrency` request loops against one endpoint until the
/// deadline, validating every response through the contract service.
pub async fn run_load_test(
    client: Arc<dyn ApiClient>,
    service: Arc<ContractService>,
    config: &LoadTestConfig,
) -> LoadTestReport {
    info!(
        "load test: {} {} at concurrency {} for {:?}",
        config.method, config.endpoint, config.concurrency, config.duration
    );
    let deadline = Instant::now() + config.duration;
    let mut handles = Vec::with_capacity(config.concurrency);
    for _ in 0..config.concurrency {
        let client = Arc::clone(&client);
        let service = Arc::clone(&service);
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            worker_loop(client, service, config, deadline).await
        }));
    }

    let mut samples = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(mut buffer) => samples.append(&mut buffer),
            // A panicked worker contributes no samples; the rest still count.
            Err(error) => log::error!("load worker panicked: {error}"),
        }
    }
    aggregate(config, samples)
}

/// Repeats a load test at increasing concurrency, stopping early once a
/// step's error rate exceeds 50%. In-flight requests of the failing step
/// still complete; no further steps are issued.
pub async fn run_stress_test(
    client: Arc<dyn ApiClient>,
    service: Arc<ContractService>,
    config: &LoadTestConfig,
    max_concurrency: usize,
) -> Vec<LoadTestReport> {
    let mut reports = Vec::new();
    for step in STRESS_STEPS {
        if step > max_concurrency {
            break;
        }
        let step_config = config.clone().with_concurrency(step);
        let report = run_load_test(Arc::clone(&client), Arc::clone(&service), &step_config).await;
        let error_rate = report.error_rate;
        reports.push(report);
        if error_rate > STRESS_ERROR_RATE_LIMIT {
            info!("stress test stopping at concurrency {step}: error rate {error_rate:.2}");
            break;
        }
    }
    reports
}

async fn worker_loop(
    client: Arc<dyn ApiClient>,
    service: Arc<ContractService>,
    config: LoadTestConfig,
    deadline: Instant,
) -> Vec<Sample> {
    let mut samples = Vec::new();
    while Instant::now() < deadline {
        let mut request = ApiRequest::new(config.method, &config.endpoint);
        if let Some(body) = &config.body {
            request = request.with_body(body.clone());
        }
        let started = Instant::now();
        let sample = match client.send(request).await {
            Ok(response) => {
                let mut failed = !response.is_success();
                if !failed {
                    if let Some(json) = &response.json {
                        failed = !service
                            .validate_response(&config.endpoint, config.method, json)
                            .map(|check| check.success)
                            .unwrap_or(false);
                    }
                }
                Sample {
                    elapsed_ms: response.elapsed.as_secs_f64() * 1000.0,
                    failed,
                }
            }
            Err(_) => Sample {
                elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
                failed: true,
            },
        };
        samples.push(sample);
        tokio::time::sleep(config.delay).await;
    }
    samples
}

fn aggregate(config: &LoadTestConfig, samples: Vec<Sample>) -> LoadTestReport {
    let total_requests = samples.len();
    let failed_requests = samples.iter().filter(|sample| sample.failed).count();
    let mut times: Vec<f64> = samples.iter().map(|sample| sample.elapsed_ms).collect();
    times.sort_by(|a, b| a.partial_cmp(b).expect("finite sample times"));

    let (avg_ms, min_ms, max_ms) = if times.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        (
            times.iter().sum::<f64>() / times.len() as f64,
            times[0],
            times[times.len() - 1],
        )
    };
    let duration_seconds = config.duration.as_secs_f64();
    LoadTestReport {
        endpoint: config.endpoint.clone(),
        method: config.method,
        concurrency: config.concurrency,
        duration_ms: config.duration.as_millis() as u64,
        total_requests,
        failed_requests,
        error_rate: if total_requests == 0 {
            0.0
        } else {
            failed_requests as f64 / total_requests as f64
        },
        avg_ms,
        min_ms,
        max_ms,
        p95_ms: percentile(&times, 95.0),
        p99_ms: percentile(&times, 99.0),
        throughput: if duration_seconds > 0.0 {
            total_requests as f64 / duration_seconds
        } else {
            0.0
        },
    }
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
