#![no_main]

use std::sync::LazyLock;

use docker_guard::security::{CommandPolicy, normalize, safe_alternative};
use libfuzzer_sys::fuzz_target;

// Compile the policy tables ONCE, reuse for all fuzz inputs
static POLICY: LazyLock<CommandPolicy> = LazyLock::new(CommandPolicy::default);

fuzz_target!(|data: &str| {
    // Unit separator splits the input into argv tokens
    let command: Vec<String> = data.split('\u{1f}').map(String::from).collect();
    let details = POLICY.evaluate(&command);
    let line = normalize(&command);

    // 1. Every detail points at its token in the normalized line
    for detail in &details {
        let found: String = line
            .chars()
            .skip(detail.offset)
            .take(detail.token.chars().count())
            .collect();
        assert_eq!(found, detail.token, "bad offset in {line:?}");
    }

    // 2. Allowed commands come back normalized
    let suggestion = safe_alternative(&POLICY, &command);
    if details.is_empty() {
        assert_eq!(suggestion, line);
    }

    // 3. Never panics (implicit)
});
