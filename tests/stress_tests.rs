//! Stress and concurrency tests for Docker Guard
//!
//! These tests verify the governance layer behaves correctly under concurrent
//! load. They never start a real docker process.

mod common;

use std::sync::Arc;
use std::time::Duration;

use docker_guard::config::GovernanceConfig;
use docker_guard::security::{AuditStatus, CommandPolicy, CommandValidator, ViolationAuditor};
use tempfile::TempDir;

use common::{ScriptedRunner, executor, fast_governance, words};

// ============== Concurrent Validator Tests ==============

#[tokio::test]
async fn test_concurrent_validation_mixed_allowed_denied() {
    let validator = Arc::new(CommandValidator::in_memory());

    let mut handles = vec![];
    for i in 0..200 {
        let v = Arc::clone(&validator);
        let line = if i % 2 == 0 {
            format!("docker logs -f app_{i}")
        } else {
            format!("docker rm -f app_{i}")
        };
        handles.push(tokio::spawn(async move { (i, v.validate(&words(&line)).is_ok()) }));
    }

    for handle in handles {
        let (i, allowed) = handle.await.unwrap();
        assert_eq!(allowed, i % 2 == 0, "unexpected verdict for command {i}");
    }
    assert_eq!(validator.auditor().total_violations(), 100);
}

#[tokio::test]
async fn test_concurrent_violations_are_all_logged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit").join("violations.log");
    let auditor = Arc::new(ViolationAuditor::new(&path, 10).unwrap());
    let validator = Arc::new(CommandValidator::new(
        CommandPolicy::default(),
        Arc::clone(&auditor),
    ));

    let mut handles = vec![];
    for i in 0..50 {
        let v = Arc::clone(&validator);
        handles.push(tokio::spawn(async move {
            v.validate(&words(&format!("docker volume rm --force vol_{i}"))).is_err()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 50);
    // Every sequence number appears exactly once
    for n in 1..=50 {
        let tag = format!("VIOLATION #{n} |");
        assert_eq!(lines.iter().filter(|l| l.contains(&tag)).count(), 1, "missing {tag}");
    }

    let report = auditor.report();
    assert_eq!(report.total_violations, 50);
    assert_eq!(report.status, AuditStatus::ViolationsDetected);
    assert_eq!(report.recent_violations.len(), 10);
}

// ============== Executor Load Tests ==============

#[tokio::test]
async fn test_concurrency_bound_under_load() {
    let runner = ScriptedRunner::with_delay(Duration::from_millis(5));
    let config = GovernanceConfig {
        max_concurrent: 3,
        ..fast_governance()
    };
    let executor = Arc::new(executor(&config, &runner));

    let mut handles = vec![];
    for i in 0..40 {
        let e = Arc::clone(&executor);
        handles.push(tokio::spawn(async move {
            e.execute(&words(&format!("docker inspect c{i}")), None).await.is_ok()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert!(runner.peak_in_flight() <= 3);
    let stats = executor.statistics();
    assert_eq!(stats.total_operations, 40);
    assert_eq!(stats.failed_operations, 0);
    assert_eq!(stats.current_concurrent, 0);
    assert!(stats.max_concurrent_seen <= 3);
    assert!((stats.success_rate - 100.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn test_start_spacing_under_load() {
    let runner = ScriptedRunner::new();
    let config = GovernanceConfig {
        min_interval_ms: 100,
        max_concurrent: 8,
        ..fast_governance()
    };
    let executor = Arc::new(executor(&config, &runner));

    let start = tokio::time::Instant::now();
    let mut handles = vec![];
    for i in 0..10 {
        let e = Arc::clone(&executor);
        handles.push(tokio::spawn(async move {
            e.execute(&words(&format!("docker ps --filter name=c{i}")), None).await.is_ok()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    // Ten starts need at least nine full intervals
    assert!(start.elapsed() >= Duration::from_millis(900));
    assert_eq!(executor.statistics().rate_limited_operations, 9);
}

#[tokio::test]
async fn test_mixed_load_statistics_are_consistent() {
    let runner = ScriptedRunner::new();
    let executor = Arc::new(executor(&fast_governance(), &runner));

    let mut handles = vec![];
    for i in 0..30 {
        let e = Arc::clone(&executor);
        let line = if i % 10 == 0 {
            format!("docker rm -f c{i}")
        } else {
            format!("docker stop c{i}")
        };
        handles.push(tokio::spawn(async move { e.execute(&words(&line), None).await.is_err() }));
    }
    let mut blocked = 0;
    for handle in handles {
        if handle.await.unwrap() {
            blocked += 1;
        }
    }

    assert_eq!(blocked, 3);
    let stats = executor.statistics();
    assert_eq!(stats.force_flag_violations, 3);
    assert_eq!(stats.total_operations, 27);
    assert_eq!(stats.failed_operations, 0);
    // Blocked commands never reach the runner
    assert_eq!(runner.calls().len(), 27);
    assert!(runner.calls().iter().all(|c| !c.contains("-f")));
}
