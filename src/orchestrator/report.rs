use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::cleanup::CleanupReport;
use crate::error::{EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_POLICY_VIOLATION, EXIT_SUCCESS};
use crate::executor::OperationStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteStatus {
    Passed,
    Failed,
    Skipped,
    Cancelled,
    PolicyViolation,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub name: String,
    pub status: SuiteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// Why the suite did not pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Cleanup that ran after this suite (or after its parallel group)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupReport>,
}

impl SuiteReport {
    #[must_use]
    pub fn not_run(name: &str, status: SuiteStatus, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            exit_code: None,
            duration: Duration::ZERO,
            reason: Some(reason.into()),
            cleanup: None,
        }
    }

    /// Whether the suite's process actually ran
    #[must_use]
    pub const fn ran(&self) -> bool {
        matches!(self.status, SuiteStatus::Passed | SuiteStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure,
    PolicyViolation,
    Interrupted,
}

impl RunOutcome {
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => EXIT_SUCCESS,
            Self::Failure => EXIT_FAILURE,
            Self::PolicyViolation => EXIT_POLICY_VIOLATION,
            Self::Interrupted => EXIT_INTERRUPTED,
        }
    }

    /// Interruption wins over a policy violation, which wins over failures
    #[must_use]
    pub fn from_suites(suites: &[SuiteReport], healthy: bool) -> Self {
        let has = |status: SuiteStatus| suites.iter().any(|s| s.status == status);
        if has(SuiteStatus::Cancelled) {
            Self::Interrupted
        } else if has(SuiteStatus::PolicyViolation) {
            Self::PolicyViolation
        } else if !healthy || has(SuiteStatus::Failed) {
            Self::Failure
        } else {
            Self::Success
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub suites: Vec<SuiteReport>,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub docker_healthy: bool,
    pub stats: OperationStats,
    pub outcome: RunOutcome,
}

impl RunReport {
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    #[must_use]
    pub fn count(&self, status: SuiteStatus) -> usize {
        self.suites.iter().filter(|s| s.status == status).count()
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
