#![no_main]

use docker_guard::config::{Config, validate_config};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsing and validating arbitrary YAML must never panic
    if let Ok(config) = serde_saphyr::from_str::<Config>(data) {
        let _ = validate_config(&config);
    }
});
