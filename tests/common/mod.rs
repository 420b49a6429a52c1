//! Shared helpers for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use docker_guard::config::GovernanceConfig;
use docker_guard::error::{GuardError, Result};
use docker_guard::executor::RateLimitedExecutor;
use docker_guard::ports::{ProcessOptions, ProcessOutput, ProcessRunner};
use docker_guard::security::CommandValidator;
use docker_guard::security::normalize;

/// Scripted outcome of one process run
#[derive(Debug, Clone)]
pub enum Outcome {
    Exit(i32, &'static str),
    Timeout,
}

/// Process runner answering from per-command scripts; unscripted commands succeed
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let runner = Self::default();
        *runner.delay.lock().unwrap() = delay;
        Arc::new(runner)
    }

    pub fn script(&self, command: &str, outcomes: Vec<Outcome>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .extend(outcomes);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &[String],
        _options: &ProcessOptions,
        timeout: Duration,
    ) -> Result<ProcessOutput> {
        let line = normalize(command);
        self.calls.lock().unwrap().push(line.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&line)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Outcome::Exit(0, ""));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Outcome::Exit(code, stderr) => Ok(ProcessOutput {
                exit_code: code,
                stdout: String::new(),
                stderr: stderr.to_string(),
                duration: delay,
            }),
            Outcome::Timeout => Err(GuardError::ProcessTimeout {
                command: line,
                timeout,
            }),
        }
    }
}

/// Governance settings without throttling and with millisecond backoff
pub fn fast_governance() -> GovernanceConfig {
    GovernanceConfig {
        min_interval_ms: 0,
        max_retries: 2,
        base_backoff_ms: 1,
        max_backoff_ms: 4,
        ..Default::default()
    }
}

pub fn executor(config: &GovernanceConfig, runner: &Arc<ScriptedRunner>) -> RateLimitedExecutor {
    RateLimitedExecutor::new(
        config,
        Arc::new(CommandValidator::in_memory()),
        Arc::clone(runner) as Arc<dyn ProcessRunner>,
    )
}

pub fn words(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}
