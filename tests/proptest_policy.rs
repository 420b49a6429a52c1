//! Property-based tests for the force-flag policy and safe alternatives.
//!
//! Uses proptest to generate command lines and verify invariants that must
//! hold for all of them, complementing the fuzz target with shrinking and
//! deterministic replay.

use proptest::prelude::*;

use docker_guard::security::{CommandPolicy, normalize, safe_alternative};

fn name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,12}"
}

fn force_token() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["-f", "--force", "-vf", "-fv", "--force=true", "-F"])
}

fn to_words(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

// ===== Verdict Properties =====

proptest! {
    /// Commands that never mention a governed program are always allowed.
    #[test]
    fn ungoverned_commands_always_allowed(
        program in "[a-z]{1,8}".prop_filter("not docker", |p| !p.starts_with("docker")),
        args in prop::collection::vec(
            "[-a-z=]{1,10}".prop_filter("no governed word", |a| !a.contains("docker")),
            0..6,
        ),
    ) {
        let mut command = vec![program];
        command.extend(args);
        prop_assert!(CommandPolicy::default().evaluate(&command).is_empty());
    }

    /// Any force token on a container removal is caught, whatever the operands.
    #[test]
    fn forced_container_removal_always_detected(
        flag in force_token(),
        containers in prop::collection::vec(name(), 1..4),
    ) {
        let mut command = to_words(&["docker", "rm", flag]);
        command.extend(containers);
        let details = CommandPolicy::default().evaluate(&command);
        prop_assert!(!details.is_empty(), "missed {flag}");
        prop_assert!(details.iter().any(|d| d.token == flag));
    }

    /// Following logs is never mistaken for forcing.
    #[test]
    fn follow_logs_always_allowed(
        flag in prop::sample::select(vec!["-f", "--follow", "-tf", "-ft"]),
        container in name(),
    ) {
        let command = to_words(&["docker", "logs", flag, &container]);
        prop_assert!(CommandPolicy::default().evaluate(&command).is_empty());
    }

    /// Operands are never matched, even when they look like a force flag.
    #[test]
    fn container_command_operands_ignored(container in name(), file in name()) {
        let command = to_words(&["docker", "exec", &container, "rm", "-f", &format!("/tmp/{file}")]);
        prop_assert!(CommandPolicy::default().evaluate(&command).is_empty());
    }

    /// Violation offsets point at the offending token in the normalized line.
    #[test]
    fn offsets_locate_tokens(flag in force_token(), container in name()) {
        let command = to_words(&["docker", "container", "rm", flag, &container]);
        let line = normalize(&command);
        for detail in CommandPolicy::default().evaluate(&command) {
            let found: String = line.chars().skip(detail.offset).take(detail.token.chars().count()).collect();
            prop_assert_eq!(found, detail.token);
        }
    }
}

// ===== Safe Alternative Properties =====

proptest! {
    /// The suggested replacement for a forced removal passes the policy itself.
    #[test]
    fn alternative_for_forced_rm_is_allowed(
        flag in prop::sample::select(vec!["-f", "--force", "-vf", "-fv"]),
        containers in prop::collection::vec(name(), 1..4),
    ) {
        let policy = CommandPolicy::default();
        let mut command = to_words(&["docker", "rm", flag]);
        command.extend(containers);

        let suggestion = safe_alternative(&policy, &command);
        prop_assert!(policy.evaluate(&[suggestion.clone()]).is_empty(), "unsafe suggestion: {suggestion}");
        prop_assert!(suggestion.contains("docker stop"));
    }

    /// Suggestions depend only on the command.
    #[test]
    fn alternative_is_deterministic(flag in force_token(), container in name()) {
        let policy = CommandPolicy::default();
        let command = to_words(&["docker", "rm", flag, &container]);
        prop_assert_eq!(safe_alternative(&policy, &command), safe_alternative(&policy, &command));
    }

    /// Allowed commands come back normalized and otherwise untouched.
    #[test]
    fn allowed_command_returned_normalized(parts in prop::collection::vec(name(), 1..6)) {
        let mut command = vec!["docker".to_string(), "inspect".to_string()];
        command.extend(parts.iter().map(|p| format!("  {p} ")));
        prop_assert_eq!(safe_alternative(&CommandPolicy::default(), &command), normalize(&command));
    }
}

// ===== Normalization Properties =====

proptest! {
    /// Normalizing an already normalized command changes nothing.
    #[test]
    fn normalize_is_idempotent(parts in prop::collection::vec(" ?[a-z-]{0,8} ?", 0..8)) {
        let once = normalize(&parts);
        let again = normalize(&once.split(' ').map(String::from).collect::<Vec<_>>());
        prop_assert_eq!(once, again);
    }
}
