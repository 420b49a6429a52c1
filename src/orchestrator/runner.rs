use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::cleanup::ResourceCleaner;
use super::report::{RunOutcome, RunReport, SuiteReport, SuiteStatus};
use super::resources::SystemProbe;
use super::suite::{SuiteContext, group_suites, order_suites};
use crate::config::{Config, OrchestratorConfig, SuiteConfig};
use crate::error::Result;
use crate::executor::{RateLimitedExecutor, TokioProcessRunner};
use crate::ports::{ProcessRunner, ResourceProbe};

/// Test-suite driver.
///
/// Sequences suites, gates them on host resources and the docker daemon's
/// health, and cleans up test resources between them through the
/// rate-limited executor.
pub struct Orchestrator {
    config: OrchestratorConfig,
    suites: Vec<SuiteConfig>,
    ctx: Arc<SuiteContext>,
    cleaner: ResourceCleaner,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        suites: Vec<SuiteConfig>,
        executor: Arc<RateLimitedExecutor>,
        runner: Arc<dyn ProcessRunner>,
        probe: Arc<dyn ResourceProbe>,
        cancel: CancellationToken,
    ) -> Self {
        let ctx = SuiteContext {
            executor: Arc::clone(&executor),
            runner,
            probe,
            force: config.force,
            cancel,
        };
        Self {
            config,
            suites,
            ctx: Arc::new(ctx),
            cleaner: ResourceCleaner::new(executor),
        }
    }

    /// Orchestrator running real processes and probing the real host
    #[must_use]
    pub fn from_config(
        config: &Config,
        executor: Arc<RateLimitedExecutor>,
        cancel: CancellationToken,
    ) -> Self {
        Self::new(
            config.orchestrator.clone(),
            config.suites.clone(),
            executor,
            Arc::new(TokioProcessRunner::default()),
            Arc::new(SystemProbe::new()),
            cancel,
        )
    }

    /// The execution groups a run would use
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::UnknownSuite`](crate::error::GuardError::UnknownSuite)
    /// for an unknown selected or ordered name.
    pub fn plan(&self, selected: &[String]) -> Result<Vec<Vec<SuiteConfig>>> {
        let ordered = order_suites(&self.suites, &self.config.order, selected)?;
        Ok(group_suites(ordered, self.config.parallel))
    }

    /// Run the selected suites (all enabled ones when `selected` is empty).
    ///
    /// Suite failures are reported, not returned as errors.
    ///
    /// # Errors
    ///
    /// Only fails when the selection names an unknown suite.
    pub async fn run(&self, selected: &[String]) -> Result<RunReport> {
        let groups = self.plan(selected)?;
        let started_at = Utc::now();
        let start = Instant::now();
        let executor = &self.ctx.executor;

        let docker_healthy = !self.config.health_check || executor.health_check().await;
        let mut reports: Vec<SuiteReport> = Vec::new();

        if !docker_healthy && !self.config.force {
            warn!("Docker daemon is not healthy, no suite will run");
            reports.extend(
                groups
                    .iter()
                    .flatten()
                    .map(|s| SuiteReport::not_run(&s.name, SuiteStatus::Skipped, "docker daemon unhealthy")),
            );
        } else {
            if !docker_healthy {
                warn!("Docker daemon is not healthy, running anyway (forced)");
            }
            let total: usize = groups.iter().map(Vec::len).sum();
            info!(suites = total, groups = groups.len(), parallel = self.config.parallel, "Starting test run");

            for group in &groups {
                let mut group_reports = if group.len() > 1 {
                    self.run_parallel(group).await
                } else {
                    let mut out = Vec::with_capacity(1);
                    for suite in group {
                        out.push(self.ctx.run_suite(suite).await);
                    }
                    out
                };

                if self.config.cleanup_between_suites
                    && !self.ctx.cancel.is_cancelled()
                    && group_reports.iter().any(SuiteReport::ran)
                {
                    let prefixes = self.cleanup_prefixes(group);
                    let cleanup = self.cleaner.cleanup(&prefixes).await;
                    if let Some(last) = group_reports.last_mut() {
                        last.cleanup = Some(cleanup);
                    }
                }
                reports.extend(group_reports);
            }
        }

        let outcome = RunOutcome::from_suites(&reports, docker_healthy || self.config.force);
        let report = RunReport {
            suites: reports,
            started_at,
            duration: start.elapsed(),
            docker_healthy,
            stats: executor.statistics(),
            outcome,
        };
        info!(
            passed = report.count(SuiteStatus::Passed),
            failed = report.count(SuiteStatus::Failed),
            skipped = report.count(SuiteStatus::Skipped),
            policy_violations = report.count(SuiteStatus::PolicyViolation),
            cancelled = report.count(SuiteStatus::Cancelled),
            outcome = ?report.outcome,
            "Test run finished"
        );
        Ok(report)
    }

    /// Run a group concurrently, at most `max_parallel_suites` at a time.
    /// Reports keep the group's order.
    async fn run_parallel(&self, group: &[SuiteConfig]) -> Vec<SuiteReport> {
        let permits = Arc::new(Semaphore::new(self.config.max_parallel_suites.max(1)));
        let mut join_set = JoinSet::new();

        for (index, suite) in group.iter().cloned().enumerate() {
            let ctx = Arc::clone(&self.ctx);
            let permits = Arc::clone(&permits);
            join_set.spawn(async move {
                let report = match permits.acquire_owned().await {
                    Ok(_permit) => ctx.run_suite(&suite).await,
                    Err(_) => SuiteReport::not_run(&suite.name, SuiteStatus::Cancelled, "run interrupted"),
                };
                (index, report)
            });
        }

        let mut results: Vec<Option<SuiteReport>> = vec![None; group.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, report)) => results[index] = Some(report),
                Err(e) => warn!("Suite task join error: {e}"),
            }
        }

        // A task that panicked or was aborted still gets a report
        results
            .into_iter()
            .zip(group)
            .map(|(report, suite)| {
                report.unwrap_or_else(|| {
                    SuiteReport::not_run(&suite.name, SuiteStatus::Failed, "suite task did not complete")
                })
            })
            .collect()
    }

    fn cleanup_prefixes(&self, group: &[SuiteConfig]) -> Vec<String> {
        let mut prefixes = self.config.cleanup_prefixes.clone();
        for prefix in group.iter().flat_map(|s| &s.cleanup_prefixes) {
            if !prefixes.contains(prefix) {
                prefixes.push(prefix.clone());
            }
        }
        prefixes
    }
}
