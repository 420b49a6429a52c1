//! Suite ordering, grouping and execution

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::report::{SuiteReport, SuiteStatus};
use crate::config::SuiteConfig;
use crate::error::{GuardError, Result};
use crate::executor::RateLimitedExecutor;
use crate::ports::{ProcessOptions, ProcessRunner, ResourceProbe};

const FAILURE_TAIL_LINES: usize = 20;

/// Pick and order the suites to run.
///
/// `selected` restricts the run to the named suites (a disabled suite named
/// here still runs). With an explicit `order`, listed suites come first in
/// that order and the rest follow by priority; otherwise suites run by
/// ascending priority, ties keeping declaration order.
///
/// # Errors
///
/// Returns [`GuardError::UnknownSuite`] for a name in `selected` or `order`
/// that no suite has.
pub fn order_suites(
    suites: &[SuiteConfig],
    order: &[String],
    selected: &[String],
) -> Result<Vec<SuiteConfig>> {
    for name in selected.iter().chain(order) {
        if !suites.iter().any(|s| &s.name == name) {
            return Err(GuardError::UnknownSuite { name: name.clone() });
        }
    }

    let mut chosen: Vec<SuiteConfig> = suites
        .iter()
        .filter(|s| {
            if selected.is_empty() {
                s.enabled
            } else {
                selected.contains(&s.name)
            }
        })
        .cloned()
        .collect();

    // Stable: equal keys keep declaration order
    chosen.sort_by_key(|s| {
        let position = order.iter().position(|n| n == &s.name).unwrap_or(usize::MAX);
        (position, s.priority)
    });
    Ok(chosen)
}

/// Split ordered suites into execution groups.
///
/// In parallel mode each run of consecutive `parallel_safe` suites forms
/// one group; every other suite is a group of its own.
#[must_use]
pub fn group_suites(ordered: Vec<SuiteConfig>, parallel: bool) -> Vec<Vec<SuiteConfig>> {
    let mut groups: Vec<Vec<SuiteConfig>> = Vec::new();
    for suite in ordered {
        let joins_previous = parallel
            && suite.parallel_safe
            && groups
                .last()
                .and_then(|g| g.last())
                .is_some_and(|prev| prev.parallel_safe);
        match groups.last_mut() {
            Some(group) if joins_previous => group.push(suite),
            _ => groups.push(vec![suite]),
        }
    }
    groups
}

/// Everything a suite needs to run, shareable across tasks
pub struct SuiteContext {
    pub executor: Arc<RateLimitedExecutor>,
    pub runner: Arc<dyn ProcessRunner>,
    pub probe: Arc<dyn ResourceProbe>,
    pub force: bool,
    pub cancel: CancellationToken,
}

impl SuiteContext {
    /// Resource gate, policy check, then the suite's own process
    pub async fn run_suite(&self, suite: &SuiteConfig) -> SuiteReport {
        if self.cancel.is_cancelled() {
            return SuiteReport::not_run(&suite.name, SuiteStatus::Cancelled, "run interrupted");
        }

        let shortfalls = self.probe.available().shortfalls(&suite.requirements);
        if !shortfalls.is_empty() {
            let reason = shortfalls.join("; ");
            if !self.force {
                warn!(suite = %suite.name, reason = %reason, "Insufficient resources, skipping suite");
                return SuiteReport::not_run(&suite.name, SuiteStatus::Skipped, reason);
            }
            warn!(suite = %suite.name, reason = %reason, "Insufficient resources, running anyway (forced)");
        }

        if let Err(e) = self.executor.check(&suite.command) {
            error!(suite = %suite.name, error = %e, "Suite command blocked by policy");
            return SuiteReport::not_run(&suite.name, SuiteStatus::PolicyViolation, e.to_string());
        }

        let options = ProcessOptions {
            stdin: None,
            working_dir: suite.working_dir.as_ref().map(|d| shellexpand::tilde(d).as_ref().into()),
            env: suite.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };

        info!(suite = %suite.name, command = %suite.command.join(" "), "Starting suite");
        let start = Instant::now();
        let outcome = tokio::select! {
            () = self.cancel.cancelled() => Err(GuardError::Cancelled),
            result = self.runner.run(&suite.command, &options, suite.timeout()) => result,
        };
        let duration = start.elapsed();

        let (status, exit_code, reason) = match outcome {
            Ok(output) if output.success() => (SuiteStatus::Passed, Some(0), None),
            Ok(output) => {
                let tail = tail(&output.stderr, &output.stdout);
                (
                    SuiteStatus::Failed,
                    Some(output.exit_code),
                    Some(format!("exit code {}{tail}", output.exit_code)),
                )
            }
            Err(GuardError::Cancelled) => (SuiteStatus::Cancelled, None, Some("run interrupted".to_string())),
            Err(e) => (SuiteStatus::Failed, None, Some(e.to_string())),
        };

        match status {
            SuiteStatus::Passed => info!(suite = %suite.name, duration_ms = duration.as_millis(), "Suite passed"),
            _ => warn!(suite = %suite.name, status = ?status, reason = ?reason, "Suite did not pass"),
        }

        SuiteReport {
            name: suite.name.clone(),
            status,
            exit_code,
            duration,
            reason,
            cleanup: None,
        }
    }
}

/// Last lines of the most useful stream, prefixed with a newline
fn tail(stderr: &str, stdout: &str) -> String {
    let source = if stderr.trim().is_empty() { stdout } else { stderr };
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = lines.len().saturating_sub(FAILURE_TAIL_LINES);
    format!("\n{}", lines[start..].join("\n"))
}
