//! The rate-limited, policy-enforcing docker executor

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::limiter::RateLimiter;
use super::process::TokioProcessRunner;
use super::retry::RetryConfig;
use super::stats::OperationStats;
use crate::config::GovernanceConfig;
use crate::error::{GuardError, Result};
use crate::ports::{ProcessOptions, ProcessOutput, ProcessRunner};
use crate::security::{CommandPolicy, CommandValidator, ViolationAuditor, normalize};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a successful call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Duration of the successful attempt, serialized as seconds
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// Failed attempts before the successful one
    pub retry_count: u32,
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// A call with everything beyond the command tokens
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub command: Vec<String>,
    pub timeout: Option<Duration>,
    pub stdin: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Overrides the executor's retry settings for this call
    pub retry: Option<RetryConfig>,
}

impl Invocation {
    #[must_use]
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub const fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            stdin: self.stdin.clone(),
            working_dir: self.working_dir.clone(),
            env: self.env.clone(),
        }
    }
}

/// Closes its batch scope when dropped
#[must_use = "batch mode ends when the guard is dropped"]
pub struct BatchGuard<'a> {
    limiter: &'a RateLimiter,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let interval = self.limiter.exit_batch();
        debug!(?interval, "Batch mode ended");
    }
}

/// Mediates every docker invocation: validation, concurrency bound,
/// start-interval throttling, retries and statistics.
pub struct RateLimitedExecutor {
    validator: Arc<CommandValidator>,
    runner: Arc<dyn ProcessRunner>,
    limiter: RateLimiter,
    retry: RetryConfig,
    default_timeout: Duration,
    cancel: CancellationToken,
}

impl RateLimitedExecutor {
    #[must_use]
    pub fn new(
        config: &GovernanceConfig,
        validator: Arc<CommandValidator>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            validator,
            runner,
            limiter: RateLimiter::new(config.min_interval(), config.max_concurrent),
            retry: config.retry_config(),
            default_timeout: config.default_timeout(),
            cancel: CancellationToken::new(),
        }
    }

    /// Build an executor running real processes, auditing to the configured log
    ///
    /// # Errors
    ///
    /// Returns an error if the audit log cannot be opened.
    pub fn from_config(config: &GovernanceConfig) -> Result<Self> {
        let auditor = match config.audit_log_path() {
            Some(path) => ViolationAuditor::new(&path, config.recent_window)?,
            None => {
                warn!("No audit log location available, violations are only counted in memory");
                ViolationAuditor::in_memory()
            }
        };
        let policy = CommandPolicy::new(&config.governed_programs);
        let validator = CommandValidator::new(policy, Arc::new(auditor));
        Ok(Self::new(
            config,
            Arc::new(validator),
            Arc::new(TokioProcessRunner::default()),
        ))
    }

    /// Stop pending and future calls when `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn validator(&self) -> &Arc<CommandValidator> {
        &self.validator
    }

    #[must_use]
    pub const fn retry_config(&self) -> RetryConfig {
        self.retry
    }

    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Validate without running. A violation is counted like a rejected call.
    pub fn check(&self, command: &[String]) -> Result<()> {
        self.validator
            .validate(command)
            .inspect_err(|_| self.limiter.record_violation())
    }

    /// Run `command` with the default options
    ///
    /// # Errors
    ///
    /// See [`execute_with`](Self::execute_with).
    pub async fn execute(&self, command: &[String], timeout: Option<Duration>) -> Result<ExecutionResult> {
        let mut invocation = Invocation::new(command.iter().cloned());
        invocation.timeout = timeout;
        self.execute_with(&invocation).await
    }

    /// Run `docker <args>`
    pub async fn docker(&self, args: &[&str], timeout: Option<Duration>) -> Result<ExecutionResult> {
        let command: Vec<String> = std::iter::once("docker")
            .chain(args.iter().copied())
            .map(String::from)
            .collect();
        self.execute(&command, timeout).await
    }

    /// Run `docker compose <args>`
    pub async fn compose(&self, args: &[&str], timeout: Option<Duration>) -> Result<ExecutionResult> {
        let command: Vec<String> = ["docker", "compose"]
            .into_iter()
            .chain(args.iter().copied())
            .map(String::from)
            .collect();
        self.execute(&command, timeout).await
    }

    /// Validate, schedule and run one call.
    ///
    /// # Errors
    ///
    /// - [`GuardError::PolicyViolation`] when the command is forbidden (nothing runs)
    /// - [`GuardError::ProcessTimeout`] when the last attempt timed out
    /// - [`GuardError::RetryExhausted`] when every attempt failed otherwise
    /// - [`GuardError::Cancelled`] when the cancellation token fired
    pub async fn execute_with(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        self.check(&invocation.command)?;
        self.limiter.record_operation();

        let retry = invocation.retry.unwrap_or(self.retry);
        let timeout = invocation.timeout.unwrap_or(self.default_timeout);
        let options = invocation.process_options();
        let line = normalize(&invocation.command);
        let mut throttled = false;
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.terminal(GuardError::Cancelled));
            }

            let err = match self
                .attempt(&invocation.command, &options, timeout, &mut throttled)
                .await
            {
                Ok(output) if output.success() => {
                    debug!(command = %line, attempts = attempt + 1, "Command succeeded");
                    return Ok(ExecutionResult {
                        exit_code: output.exit_code,
                        stdout: output.stdout,
                        stderr: output.stderr,
                        duration: output.duration,
                        retry_count: attempt,
                    });
                }
                Ok(output) => failure_from_output(&line, &output),
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(self.terminal(err));
            }

            if attempt >= retry.max_retries {
                error!(
                    command = %line,
                    attempts = attempt + 1,
                    error = %err,
                    "Command failed after all attempts"
                );
                let err = match err {
                    GuardError::ProcessTimeout { .. } => err,
                    other => GuardError::RetryExhausted {
                        attempts: attempt + 1,
                        source: Box::new(other),
                    },
                };
                return Err(self.terminal(err));
            }

            let delay = retry.delay_for_retry(attempt);
            debug!(
                command = %line,
                attempt = attempt + 1,
                delay_ms = delay.as_millis(),
                error = %err,
                "Attempt failed, backing off"
            );
            tokio::select! {
                () = self.cancel.cancelled() => return Err(self.terminal(GuardError::Cancelled)),
                () = sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// One attempt: slot, start reservation, process
    async fn attempt(
        &self,
        command: &[String],
        options: &ProcessOptions,
        timeout: Duration,
        throttled: &mut bool,
    ) -> Result<ProcessOutput> {
        let _slot = tokio::select! {
            () = self.cancel.cancelled() => return Err(GuardError::Cancelled),
            slot = self.limiter.acquire_slot() => slot?,
        };

        let start = self.limiter.reserve_start();
        if start > Instant::now() {
            if !*throttled {
                *throttled = true;
                self.limiter.record_rate_limited();
            }
            debug!(wait_ms = (start - Instant::now()).as_millis(), "Throttling start");
            tokio::select! {
                () = self.cancel.cancelled() => return Err(GuardError::Cancelled),
                () = sleep_until(start) => {}
            }
        }

        tokio::select! {
            () = self.cancel.cancelled() => Err(GuardError::Cancelled),
            result = self.runner.run(command, options, timeout) => result,
        }
    }

    fn terminal(&self, err: GuardError) -> GuardError {
        self.limiter.record_failure();
        err
    }

    /// Whether the docker daemon answers. Never fails.
    pub async fn health_check(&self) -> bool {
        let invocation = Invocation::new(["docker", "version", "--format", "{{.Server.Version}}"])
            .timeout(HEALTH_CHECK_TIMEOUT)
            .retry(RetryConfig::no_retry());
        match self.execute_with(&invocation).await {
            Ok(result) => {
                info!(server_version = %result.stdout.trim(), "Docker daemon is healthy");
                true
            }
            Err(e) => {
                warn!(error = %e, "Docker health check failed");
                false
            }
        }
    }

    /// Halve the start interval until the guard is dropped
    ///
    /// Scopes may overlap and end in any order. The interval is derived from
    /// the configured base and the number of open scopes, so it returns to
    /// the base once every guard is gone.
    pub fn batch_mode(&self) -> BatchGuard<'_> {
        let interval = self.limiter.enter_batch();
        debug!(?interval, "Batch mode started");
        BatchGuard {
            limiter: &self.limiter,
        }
    }

    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.limiter.min_interval()
    }

    #[must_use]
    pub fn statistics(&self) -> OperationStats {
        OperationStats::from_state(
            &self.limiter.snapshot(),
            self.limiter.max_concurrent(),
            self.validator.auditor().report(),
        )
    }

    /// Clear the operation counters
    pub fn reset(&self) {
        self.limiter.reset();
        info!("Executor statistics reset");
    }
}

fn failure_from_output(command: &str, output: &ProcessOutput) -> GuardError {
    let stderr = output.stderr.trim();
    let reason = if stderr.is_empty() {
        format!("exit code {}", output.exit_code)
    } else {
        format!("exit code {}: {stderr}", output.exit_code)
    };
    GuardError::ProcessFailure {
        command: command.to_string(),
        exit_code: Some(output.exit_code),
        reason,
    }
}
