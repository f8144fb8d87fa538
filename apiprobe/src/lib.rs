//! CLI wrapper around the apiprobe engine.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use apiprobe_core::{
    discover, load, product_version_chain, run_from_spec_path, run_load_test, run_stress_test,
    ApiClient, ContractError, ContractService, EvolutionChecker, GeneratorConfig, HttpApiClient,
    LoadTestConfig, Method, RunError, RunnerConfig,
};
use apiprobe_test_support::MockBackend;

pub mod cli;
mod output;

pub use cli::{Cli, Command};

pub async fn run(cli: Cli) -> ExitCode {
    let generator = GeneratorConfig::default()
        .with_seed(cli.seed)
        .with_optional_field_probability(cli.optional_field_probability);
    let json = cli.json;

    match cli.command {
        Command::Run {
            spec,
            base_url,
            ci,
            endpoint_allowlist,
            endpoint_blocklist,
            placeholder_id,
            full_trace,
            timeout_seconds,
        } => {
            let client =
                match HttpApiClient::new(&base_url, Duration::from_secs(timeout_seconds)) {
                    Ok(client) => client,
                    Err(error) => {
                        return output::error_exit(
                            &format!("failed to build HTTP client: {error}"),
                            json,
                        )
                    }
                };
            let mut config = RunnerConfig::default()
                .with_generator(generator)
                .with_allowlist(endpoint_allowlist)
                .with_blocklist(endpoint_blocklist);
            if ci {
                config = config.with_ci_mode(true);
            }
            if let Some(placeholder_id) = placeholder_id {
                config.placeholder_id = placeholder_id;
            }

            match run_from_spec_path(&client, &spec, &config).await {
                Ok(mut summary) => {
                    if !full_trace {
                        for result in &mut summary.results {
                            result.trace = None;
                        }
                    }
                    if json {
                        output::print_json(&summary);
                    } else {
                        print!("{}", output::format_run_summary(&summary));
                    }
                    if summary.all_passed() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::from(1)
                    }
                }
                Err(RunError::Contract(ContractError::CiViolation(violation))) => {
                    if json {
                        output::print_json(&*violation);
                    } else {
                        eprintln!(
                            "contract violation in CI: {} {} {} ({} errors)",
                            violation.method,
                            violation.endpoint,
                            violation.direction,
                            violation.errors.len()
                        );
                    }
                    ExitCode::from(1)
                }
                Err(error) => output::error_exit(&error.to_string(), json),
            }
        }

        Command::Load {
            spec,
            base_url,
            endpoint,
            method,
            concurrency,
            duration_ms,
            stress,
            timeout_seconds,
        } => {
            let Some(method) = Method::parse(&method) else {
                return output::error_exit(&format!("unsupported method '{method}'"), json);
            };
            let client: Arc<dyn ApiClient> =
                match HttpApiClient::new(&base_url, Duration::from_secs(timeout_seconds)) {
                    Ok(client) => Arc::new(client),
                    Err(error) => {
                        return output::error_exit(
                            &format!("failed to build HTTP client: {error}"),
                            json,
                        )
                    }
                };
            let document = match load(&spec) {
                Ok(document) => document,
                Err(error) => return output::error_exit(&error.to_string(), json),
            };
            let set = Arc::new(document.schemas.clone());
            let mut service = ContractService::new(discover(&document, &set)).with_ci_mode(false);
            service.initialize();
            let service = Arc::new(service);

            let config = LoadTestConfig::new(endpoint, method)
                .with_concurrency(concurrency)
                .with_duration(Duration::from_millis(duration_ms));
            let reports = if stress {
                run_stress_test(client, service, &config, concurrency).await
            } else {
                vec![run_load_test(client, service, &config).await]
            };
            if json {
                output::print_json(&reports);
            } else {
                for report in &reports {
                    print!("{}", output::format_load_report(report));
                }
            }
            let overloaded = reports
                .last()
                .map(|report| report.error_rate > 0.5)
                .unwrap_or(true);
            if overloaded {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }

        Command::Evolution => {
            let checker = EvolutionChecker::new(product_version_chain()).with_generator(generator);
            let report = checker.check_all();
            if json {
                output::print_json(&report);
            } else {
                print!("{}", output::format_evolution_report(&report));
            }
            if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }

        Command::ServeMock => {
            let backend = MockBackend::spawn().await;
            println!("mock backend listening on {}", backend.base_url());
            std::future::pending::<()>().await;
            ExitCode::SUCCESS
        }
    }
}
