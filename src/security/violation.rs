//! Record of a rejected command and the signatures it matched

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single forbidden token found in a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationDetail {
    /// Name of the signature that matched (e.g. `short-force`)
    pub pattern: String,
    pub description: String,
    /// The offending token as it appeared in the command
    pub token: String,
    /// Character offset of the token in the normalized command
    pub offset: usize,
}

impl fmt::Display for ViolationDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] '{}' at offset {}",
            self.description, self.pattern, self.token, self.offset
        )
    }
}

/// Immutable record of a rejected command.
///
/// Only the validator creates these; the auditor persists them.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyViolation {
    pub command: String,
    pub violation_details: Vec<ViolationDetail>,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

impl PolicyViolation {
    #[must_use]
    pub fn new(command: &str, violation_details: Vec<ViolationDetail>, sequence: u64) -> Self {
        Self {
            command: command.to_string(),
            violation_details,
            timestamp: Utc::now(),
            sequence,
        }
    }

    /// Render all details on one line, separated by `; `
    #[must_use]
    pub fn details_summary(&self) -> String {
        self.violation_details
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Names of the signatures that matched, in detection order
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        self.violation_details
            .iter()
            .map(|d| d.pattern.as_str())
            .collect()
    }
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.command, self.details_summary())
    }
}

impl std::error::Error for PolicyViolation {}
