//! CLI runner functions
//!
//! Each returns the process exit code on completion. Errors are left to the
//! caller, which maps them through [`GuardError::exit_code`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::error::{EXIT_FAILURE, EXIT_POLICY_VIOLATION, EXIT_SUCCESS, GuardError, Result};
use crate::executor::{Invocation, RateLimitedExecutor, RetryConfig};
use crate::orchestrator::{Orchestrator, RunReport, SuiteStatus};
use crate::security::{CommandPolicy, DEFAULT_RECENT_WINDOW};

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Validate a command, or list the policy rules
///
/// # Errors
///
/// Only JSON serialization can fail; a violation is reported through the
/// exit code.
pub fn run_check(executor: &RateLimitedExecutor, list: bool, command: &[String], json: bool) -> Result<i32> {
    if list {
        println!("Governed programs: {}", executor.validator().policy().governed_programs().join(", "));
        for rule in CommandPolicy::rules() {
            println!("  {:<10} {:<28} {}", rule.kind, rule.name, rule.description);
        }
        return Ok(EXIT_SUCCESS);
    }

    match executor.check(command) {
        Ok(()) => {
            if json {
                print_json(&serde_json::json!({ "allowed": true }))?;
            } else {
                println!("ALLOWED");
            }
            Ok(EXIT_SUCCESS)
        }
        Err(GuardError::PolicyViolation(violation)) => {
            let alternative = executor.validator().get_safe_alternative(command);
            if json {
                print_json(&serde_json::json!({
                    "allowed": false,
                    "violation": violation,
                    "safe_alternative": alternative,
                }))?;
            } else {
                println!("BLOCKED: {}", violation.command);
                for detail in &violation.violation_details {
                    println!("  - {detail}");
                }
                println!("\n{alternative}");
            }
            Ok(EXIT_POLICY_VIOLATION)
        }
        Err(e) => Err(e),
    }
}

/// Print the safe alternative for a command
pub fn run_alternative(executor: &RateLimitedExecutor, command: &[String]) -> i32 {
    println!("{}", executor.validator().get_safe_alternative(command));
    EXIT_SUCCESS
}

/// Parameters of `docker-guard exec`
pub struct ExecArgs {
    pub command: Vec<String>,
    pub timeout: Option<u64>,
    pub stdin: Option<String>,
    pub working_dir: Option<std::path::PathBuf>,
    pub retries: Option<u32>,
}

/// Execute one command through the governance layer
///
/// # Errors
///
/// Returns an error if:
/// - The command is forbidden by the force-flag policy
/// - Every attempt failed or the last one timed out
/// - The run was interrupted
pub async fn run_exec(executor: &RateLimitedExecutor, args: ExecArgs, json: bool) -> Result<i32> {
    let mut invocation = Invocation::new(args.command);
    if let Some(secs) = args.timeout {
        invocation = invocation.timeout(Duration::from_secs(secs));
    }
    if let Some(payload) = args.stdin {
        invocation = invocation.stdin(payload);
    }
    if let Some(dir) = args.working_dir {
        invocation = invocation.working_dir(dir);
    }
    if let Some(retries) = args.retries {
        info!(retries, "Retry count overridden");
        invocation = invocation.retry(RetryConfig {
            max_retries: retries,
            ..executor.retry_config()
        });
    }

    let result = match executor.execute_with(&invocation).await {
        Ok(result) => result,
        Err(e) => {
            // A child that ran and failed keeps its own exit code
            return match failed_child_code(&e) {
                Some(code) => {
                    eprintln!("{e}");
                    Ok(code)
                }
                None => Err(e),
            };
        }
    };
    if json {
        print_json(&result)?;
    } else {
        print!("{}", result.stdout);
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
    }
    Ok(result.exit_code)
}

fn failed_child_code(err: &GuardError) -> Option<i32> {
    match err {
        GuardError::ProcessFailure {
            exit_code: Some(code),
            ..
        } if *code > 0 => Some(*code),
        GuardError::RetryExhausted { source, .. } => failed_child_code(source),
        _ => None,
    }
}

/// Check the docker daemon
pub async fn run_health(executor: &RateLimitedExecutor, json: bool) -> Result<i32> {
    let healthy = executor.health_check().await;
    if json {
        print_json(&serde_json::json!({ "docker_healthy": healthy }))?;
    } else {
        println!("Docker daemon: {}", if healthy { "healthy" } else { "UNAVAILABLE" });
    }
    Ok(if healthy { EXIT_SUCCESS } else { EXIT_FAILURE })
}

/// Print executor statistics as JSON, optionally after probing the daemon
pub async fn run_stats(executor: &RateLimitedExecutor, probe: bool) -> Result<i32> {
    if probe {
        executor.health_check().await;
    }
    print_json(&executor.statistics())?;
    Ok(EXIT_SUCCESS)
}

/// Print the audit report as JSON
pub fn run_audit(executor: &RateLimitedExecutor, recent: Option<usize>) -> Result<i32> {
    let auditor = executor.validator().auditor();
    print_json(&auditor.report_with_window(recent.unwrap_or(DEFAULT_RECENT_WINDOW)))?;
    Ok(EXIT_SUCCESS)
}

/// Run the configured test suites
///
/// # Errors
///
/// Returns an error if a selected suite is not configured.
pub async fn run_suites(
    config: &Config,
    executor: Arc<RateLimitedExecutor>,
    cancel: CancellationToken,
    selected: &[String],
    dry_run: bool,
    json: bool,
) -> Result<i32> {
    let orchestrator = Orchestrator::from_config(config, executor, cancel);

    if dry_run {
        for (index, group) in orchestrator.plan(selected)?.iter().enumerate() {
            let names: Vec<&str> = group.iter().map(|s| s.name.as_str()).collect();
            println!("Group {}: {}", index + 1, names.join(", "));
        }
        return Ok(EXIT_SUCCESS);
    }

    let report = orchestrator.run(selected).await?;
    if json {
        print_json(&report)?;
    } else {
        print_run_report(&report);
    }
    Ok(report.exit_code())
}

fn print_run_report(report: &RunReport) {
    println!("\nTest Run Summary");
    println!("================\n");
    if !report.docker_healthy {
        println!("Docker daemon was not healthy at start.\n");
    }
    for suite in &report.suites {
        let label = match suite.status {
            SuiteStatus::Passed => "PASSED",
            SuiteStatus::Failed => "FAILED",
            SuiteStatus::Skipped => "SKIPPED",
            SuiteStatus::Cancelled => "CANCELLED",
            SuiteStatus::PolicyViolation => "BLOCKED",
        };
        println!("  {label:<10} {:<24} {:>8.2}s", suite.name, suite.duration.as_secs_f64());
        if let Some(reason) = &suite.reason {
            for line in reason.lines().take(5) {
                println!("             {line}");
            }
        }
        if let Some(cleanup) = &suite.cleanup
            && !cleanup.is_clean()
        {
            println!("             cleanup: {} error(s)", cleanup.errors.len());
        }
    }

    let stats = &report.stats;
    println!(
        "\n{} passed, {} failed, {} skipped, {} blocked in {:.1}s",
        report.count(SuiteStatus::Passed),
        report.count(SuiteStatus::Failed),
        report.count(SuiteStatus::Skipped),
        report.count(SuiteStatus::PolicyViolation),
        report.duration.as_secs_f64()
    );
    println!(
        "docker calls: {} ({} rate limited, {} blocked)",
        stats.total_operations, stats.rate_limited_operations, stats.force_flag_violations
    );
}
