use std::time::Duration;

use thiserror::Error;

use crate::security::PolicyViolation;

/// Exit code for a run in which every suite passed.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for ordinary failures (test failures, exhausted retries, bad config).
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for a blocked destructive docker operation. Build-breaking.
pub const EXIT_POLICY_VIOLATION: i32 = 2;
/// Exit code for a run stopped by the user.
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Error, Debug)]
pub enum GuardError {
    // Policy errors
    #[error("Policy violation: {0}")]
    PolicyViolation(Box<PolicyViolation>),

    // Process errors
    #[error("Process timed out after {timeout:?}: {command}")]
    ProcessTimeout { command: String, timeout: Duration },

    #[error("Process failed: {command} ({reason})")]
    ProcessFailure {
        command: String,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<GuardError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid { field: String, reason: String },

    // Orchestrator errors
    #[error("Unknown test suite: {name}")]
    UnknownSuite { name: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

impl From<PolicyViolation> for GuardError {
    fn from(violation: PolicyViolation) -> Self {
        Self::PolicyViolation(Box::new(violation))
    }
}

impl GuardError {
    /// Whether the executor may retry an attempt that failed with this error.
    ///
    /// Policy violations are never retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProcessTimeout { .. } | Self::ProcessFailure { .. }
        )
    }

    /// Whether this error (or the error it wraps) is a policy violation.
    #[must_use]
    pub fn is_policy_violation(&self) -> bool {
        match self {
            Self::PolicyViolation(_) => true,
            Self::RetryExhausted { source, .. } => source.is_policy_violation(),
            _ => false,
        }
    }

    /// Process exit code a CLI should terminate with for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_policy_violation() {
            EXIT_POLICY_VIOLATION
        } else if matches!(self, Self::Cancelled) {
            EXIT_INTERRUPTED
        } else {
            EXIT_FAILURE
        }
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;
