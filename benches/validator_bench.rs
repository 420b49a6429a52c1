//! Benchmarks for command validation and executor overhead
//!
//! Run with: cargo bench

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{Criterion, criterion_group, criterion_main};
use docker_guard::config::GovernanceConfig;
use docker_guard::error::Result;
use docker_guard::executor::RateLimitedExecutor;
use docker_guard::ports::{ProcessOptions, ProcessOutput, ProcessRunner};
use docker_guard::security::{CommandPolicy, CommandValidator, safe_alternative};

fn words(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}

/// Runner that succeeds instantly, isolating the executor's own cost
struct InstantRunner;

#[async_trait]
impl ProcessRunner for InstantRunner {
    async fn run(&self, _: &[String], _: &ProcessOptions, _: Duration) -> Result<ProcessOutput> {
        Ok(ProcessOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        })
    }
}

fn benchmark_policy(c: &mut Criterion) {
    let policy = CommandPolicy::default();

    let simple = words("docker ps -a");
    c.bench_function("policy: simple command (docker ps -a)", |b| {
        b.iter(|| policy.evaluate(black_box(&simple)));
    });

    let complex = words("docker run --rm -v /data:/data -e MODE=ci alpine sh -c 'rm -f /tmp/x'");
    c.bench_function("policy: complex command (docker run)", |b| {
        b.iter(|| policy.evaluate(black_box(&complex)));
    });

    let forced = words("docker rm -f test_db test_cache");
    c.bench_function("policy: forbidden command (docker rm -f)", |b| {
        b.iter(|| policy.evaluate(black_box(&forced)));
    });

    let embedded = vec![
        "sh".to_string(),
        "-c".to_string(),
        "docker compose -f ci.yml down && docker volume prune --force".to_string(),
    ];
    c.bench_function("policy: embedded shell script", |b| {
        b.iter(|| policy.evaluate(black_box(&embedded)));
    });

    c.bench_function("safe alternative (docker rm -vf)", |b| {
        let command = words("docker rm -vf c1 c2");
        b.iter(|| safe_alternative(&policy, black_box(&command)));
    });
}

fn benchmark_policy_creation(c: &mut Criterion) {
    let governed = vec!["docker".to_string(), "docker-compose".to_string()];
    c.bench_function("policy creation (default tables)", |b| {
        b.iter(|| CommandPolicy::new(black_box(&governed)));
    });
}

fn benchmark_executor(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Runtime::new() else {
        return;
    };
    let config = GovernanceConfig {
        min_interval_ms: 0,
        ..Default::default()
    };
    let executor = RateLimitedExecutor::new(
        &config,
        Arc::new(CommandValidator::in_memory()),
        Arc::new(InstantRunner),
    );
    let command = words("docker inspect test_db");

    c.bench_function("executor: allowed call, instant runner", |b| {
        b.to_async(&runtime)
            .iter(|| async { executor.execute(black_box(&command), None).await });
    });
}

criterion_group!(
    benches,
    benchmark_policy,
    benchmark_policy_creation,
    benchmark_executor
);
criterion_main!(benches);
