use std::process::ExitCode;

use apiprobe_core::{EvolutionReport, LoadTestReport, RunSummary};
use serde::Serialize;

#[derive(Serialize)]
struct CliError<'a> {
    status: &'static str,
    message: &'a str,
}

pub(super) fn error_exit(message: &str, json: bool) -> ExitCode {
    if json {
        let payload = CliError {
            status: "error",
            message,
        };
        let output = serde_json::to_string_pretty(&payload).unwrap_or(message.to_string());
        eprintln!("{output}");
    } else {
        eprintln!("{message}");
    }
    ExitCode::from(2)
}

pub(super) fn print_json<T: Serialize>(payload: &T) {
    let output =
        serde_json::to_string_pretty(payload).unwrap_or("<failed to serialize output>".to_string());
    println!("{output}");
}

pub(super) fn format_run_summary(summary: &RunSummary) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Endpoints: {} total, {} passed, {} failed\n",
        summary.total, summary.passed, summary.failed
    ));
    for result in summary.failures() {
        output.push_str(&format!(
            "- FAIL {} {} (status {})\n",
            result.method, result.path, result.status
        ));
        for step in result.failed_steps() {
            output.push_str(&format!("    {}: {}\n", step.name, step.detail));
        }
    }
    for result in &summary.results {
        let Some(trace) = &result.trace else {
            continue;
        };
        output.push_str(&format!("TRACE {} {}\n", result.method, result.path));
        if let Some(body) = &trace.request.body {
            output.push_str(&format!("    request: {body}\n"));
        }
        match &trace.response {
            Some(body) if !body.trim().is_empty() => {
                output.push_str(&format!("    response ({}): {body}\n", result.status));
            }
            Some(_) => {
                output.push_str(&format!("    response ({}): <empty>\n", result.status));
            }
            None => output.push_str("    response: <transport failure>\n"),
        }
    }
    if !summary.violations.is_empty() {
        output.push_str("Contract violations:\n");
        for violation in &summary.violations {
            output.push_str(&format!(
                "- {} {} {}: {} error(s)\n",
                violation.method,
                violation.endpoint,
                violation.direction,
                violation.errors.len()
            ));
            for error in &violation.errors {
                let path = if error.path.is_empty() { "/" } else { &error.path };
                output.push_str(&format!("    {}: {}\n", path, error.message));
            }
        }
    }
    if !summary.warnings.is_empty() {
        output.push_str("Discovery warnings:\n");
        for warning in &summary.warnings {
            output.push_str(&format!("- {warning}\n"));
        }
    }
    output.push_str(&format!(
        "Endpoint coverage: {:.1}% ({}/{})\n",
        summary.coverage.endpoints.percent,
        summary.coverage.endpoints.tested,
        summary.coverage.endpoints.total
    ));
    for untested in &summary.coverage.endpoints.untested_list {
        output.push_str(&format!("  untested: {untested}\n"));
    }
    output.push_str(&format!(
        "Schema coverage: {:.1}% ({}/{})\n",
        summary.coverage.schemas.percent,
        summary.coverage.schemas.tested,
        summary.coverage.schemas.total
    ));
    for untested in &summary.coverage.schemas.untested_list {
        output.push_str(&format!("  untested: {untested}\n"));
    }
    output
}

pub(super) fn format_load_report(report: &LoadTestReport) -> String {
    format!(
        "{} {} @ {} workers for {}ms\n\
         requests: {} total, {} failed (error rate {:.1}%)\n\
         latency ms: avg {:.1}, min {:.1}, max {:.1}, p95 {:.1}, p99 {:.1}\n\
         throughput: {:.1} req/s\n",
        report.method,
        report.endpoint,
        report.concurrency,
        report.duration_ms,
        report.total_requests,
        report.failed_requests,
        report.error_rate * 100.0,
        report.avg_ms,
        report.min_ms,
        report.max_ms,
        report.p95_ms,
        report.p99_ms,
        report.throughput
    )
}

pub(super) fn format_evolution_report(report: &EvolutionReport) -> String {
    let mut output = String::new();
    for finding in &report.findings {
        output.push_str(&format!(
            "[{}] {} {}: {}\n",
            if finding.passed { "ok" } else { "DEFECT" },
            finding.check,
            finding.subject,
            finding.detail
        ));
    }
    for warning in &report.warnings {
        output.push_str(&format!("warning: {warning}\n"));
    }
    output.push_str(if report.passed() {
        "Evolution checks passed\n"
    } else {
        "Evolution checks found defects\n"
    });
    output
}
