//! Statistics snapshot of a [`RateLimitedExecutor`](super::RateLimitedExecutor)

use serde::Serialize;

use super::limiter::RateLimiterState;
use crate::security::AuditReport;

/// Point-in-time statistics of one executor
#[derive(Debug, Clone, Serialize)]
pub struct OperationStats {
    pub total_operations: u64,
    pub failed_operations: u64,
    pub rate_limited_operations: u64,
    pub force_flag_violations: u64,
    /// Percentage of accepted calls that succeeded (0.0 when none ran)
    pub success_rate: f64,
    pub current_concurrent: usize,
    /// Configured concurrency bound
    pub max_concurrent: usize,
    /// Highest in-flight count observed since the last reset
    pub max_concurrent_seen: usize,
    pub min_interval_ms: u64,
    /// Percentage of accepted calls that had to wait for a start slot
    pub rate_limit_percentage: f64,
    pub audit: AuditReport,
}

impl OperationStats {
    #[must_use]
    pub fn from_state(state: &RateLimiterState, max_concurrent: usize, audit: AuditReport) -> Self {
        Self {
            total_operations: state.total_operations,
            failed_operations: state.failed_operations,
            rate_limited_operations: state.rate_limited_operations,
            force_flag_violations: state.force_flag_violations,
            success_rate: percentage(
                state.total_operations.saturating_sub(state.failed_operations),
                state.total_operations,
            ),
            current_concurrent: state.current_concurrent,
            max_concurrent,
            max_concurrent_seen: state.max_concurrent_seen,
            min_interval_ms: u64::try_from(state.min_interval().as_millis()).unwrap_or(u64::MAX),
            rate_limit_percentage: percentage(state.rate_limited_operations, state.total_operations),
            audit,
        }
    }
}

#[expect(clippy::cast_precision_loss)]
fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}
