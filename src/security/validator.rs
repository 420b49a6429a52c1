//! Command validation against the force-flag policy

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use super::alternatives::safe_alternative;
use super::audit::ViolationAuditor;
use super::policy::{CommandPolicy, normalize};
use super::violation::PolicyViolation;
use crate::error::{GuardError, Result};

/// Validates docker commands before they reach a process.
///
/// Every rejection is recorded by the attached [`ViolationAuditor`] before
/// the error is returned.
pub struct CommandValidator {
    policy: CommandPolicy,
    auditor: Arc<ViolationAuditor>,
    sequence: AtomicU64,
}

impl CommandValidator {
    #[must_use]
    pub const fn new(policy: CommandPolicy, auditor: Arc<ViolationAuditor>) -> Self {
        Self {
            policy,
            auditor,
            sequence: AtomicU64::new(0),
        }
    }

    /// Validator with the default policy and an in-memory auditor
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(CommandPolicy::default(), Arc::new(ViolationAuditor::in_memory()))
    }

    /// Validate a command given as tokens.
    ///
    /// Empty commands and commands for programs outside the governed set
    /// pass. Validation has no side effects unless the command is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::PolicyViolation`] listing every forbidden token
    /// found, in order of appearance.
    pub fn validate(&self, command: &[String]) -> Result<()> {
        let details = self.policy.evaluate(command);
        if details.is_empty() {
            debug!(command = %normalize(command), "Command passed policy check");
            return Ok(());
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let violation = PolicyViolation::new(&normalize(command), details, sequence);
        self.auditor.record(&violation);
        Err(GuardError::from(violation))
    }

    /// Suggest a safe replacement for `command`. Never fails.
    #[must_use]
    pub fn get_safe_alternative(&self, command: &[String]) -> String {
        safe_alternative(&self.policy, command)
    }

    #[must_use]
    pub const fn policy(&self) -> &CommandPolicy {
        &self.policy
    }

    #[must_use]
    pub fn auditor(&self) -> &Arc<ViolationAuditor> {
        &self.auditor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_safe_command_passes_without_audit() {
        let validator = CommandValidator::in_memory();
        assert!(validator.validate(&cmd(&["docker", "ps", "-a"])).is_ok());
        assert!(validator.validate(&cmd(&["docker", "logs", "-f", "web"])).is_ok());
        assert_eq!(validator.auditor().total_violations(), 0);
    }

    #[test]
    fn test_empty_command_passes() {
        let validator = CommandValidator::in_memory();
        assert!(validator.validate(&[]).is_ok());
        assert!(validator.validate(&cmd(&["  "])).is_ok());
    }

    #[test]
    fn test_violation_is_audited_and_returned() {
        let validator = CommandValidator::in_memory();
        let err = validator
            .validate(&cmd(&["docker", "rm", "-f", "c1"]))
            .unwrap_err();

        match err {
            GuardError::PolicyViolation(v) => {
                assert_eq!(v.command, "docker rm -f c1");
                assert_eq!(v.patterns(), vec!["short-force"]);
                assert_eq!(v.violation_details[0].offset, 10);
                assert_eq!(v.sequence, 1);
            }
            other => panic!("expected policy violation, got {other:?}"),
        }
        assert_eq!(validator.auditor().total_violations(), 1);
    }

    #[test]
    fn test_sequence_increments() {
        let validator = CommandValidator::in_memory();
        for expected in 1..=3 {
            let err = validator
                .validate(&cmd(&["docker", "rmi", "--force", "img"]))
                .unwrap_err();
            let GuardError::PolicyViolation(v) = err else {
                panic!("expected policy violation");
            };
            assert_eq!(v.sequence, expected);
        }
        assert_eq!(validator.auditor().total_violations(), 3);
    }

    #[test]
    fn test_non_governed_program_passes() {
        let validator = CommandValidator::in_memory();
        assert!(validator.validate(&cmd(&["rm", "-f", "file.txt"])).is_ok());
    }

    #[test]
    fn test_shared_auditor_across_validators() {
        let auditor = Arc::new(ViolationAuditor::in_memory());
        let a = CommandValidator::new(CommandPolicy::default(), Arc::clone(&auditor));
        let b = CommandValidator::new(CommandPolicy::default(), Arc::clone(&auditor));

        let _ = a.validate(&cmd(&["docker", "rm", "-f", "x"]));
        let _ = b.validate(&cmd(&["docker", "rm", "-f", "y"]));
        assert_eq!(auditor.total_violations(), 2);
    }

    #[test]
    fn test_safe_alternative_passes_validation() {
        let validator = CommandValidator::in_memory();
        let suggestion = validator.get_safe_alternative(&cmd(&["docker", "rm", "-f", "c1"]));
        let tokens: Vec<String> = suggestion
            .split_whitespace()
            .map(ToString::to_string)
            .collect();
        assert!(validator.validate(&tokens).is_ok());
    }
}
