use super::types::Config;
use crate::error::{GuardError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Load configuration from a YAML file
///
/// # Errors
///
/// Returns an error if:
/// - The configuration file does not exist
/// - The file cannot be read
/// - The YAML content is invalid or cannot be parsed
/// - The configuration fails validation
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(GuardError::ConfigNotFound {
            path: path.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_saphyr::from_str(&content)?;

    validate_config(&config)?;

    info!(
        config_path = %path.display(),
        suites = config.suites.len(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Load the explicit file, or the default file when it exists, or defaults.
///
/// # Errors
///
/// A missing explicit file is an error; a missing default file is not.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return load_config(path);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        load_config(&default_path)
    } else {
        debug!(path = %default_path.display(), "No configuration file, using defaults");
        Ok(Config::default())
    }
}

/// Validate the configuration
///
/// # Errors
///
/// Returns [`GuardError::ConfigInvalid`] naming the first offending field.
pub fn validate_config(config: &Config) -> Result<()> {
    let governance = &config.governance;

    if governance.max_concurrent == 0 {
        return Err(invalid("governance.max_concurrent", "must be at least 1"));
    }

    if governance.governed_programs.is_empty()
        || governance.governed_programs.iter().any(|p| p.trim().is_empty())
    {
        return Err(invalid(
            "governance.governed_programs",
            "at least one non-empty program name is required",
        ));
    }

    if governance.base_backoff_ms > governance.max_backoff_ms {
        return Err(invalid(
            "governance.base_backoff_ms",
            "must not exceed governance.max_backoff_ms",
        ));
    }

    if config.orchestrator.max_parallel_suites == 0 {
        return Err(invalid("orchestrator.max_parallel_suites", "must be at least 1"));
    }

    if config.orchestrator.cleanup_prefixes.iter().any(String::is_empty) {
        return Err(invalid(
            "orchestrator.cleanup_prefixes",
            "an empty prefix would match every resource",
        ));
    }

    let mut names = HashSet::new();
    for (i, suite) in config.suites.iter().enumerate() {
        if suite.name.trim().is_empty() {
            return Err(invalid(&format!("suites[{i}].name"), "name cannot be empty"));
        }
        if !names.insert(suite.name.as_str()) {
            return Err(invalid(
                &format!("suites.{}", suite.name),
                "duplicate suite name",
            ));
        }
        if suite.command.is_empty() || suite.command[0].trim().is_empty() {
            return Err(invalid(
                &format!("suites.{}.command", suite.name),
                "command cannot be empty",
            ));
        }
        if suite.cleanup_prefixes.iter().any(String::is_empty) {
            return Err(invalid(
                &format!("suites.{}.cleanup_prefixes", suite.name),
                "an empty prefix would match every resource",
            ));
        }
    }

    for name in &config.orchestrator.order {
        if !names.contains(name.as_str()) {
            return Err(invalid(
                "orchestrator.order",
                &format!("unknown suite '{name}'"),
            ));
        }
    }

    Ok(())
}

fn invalid(field: &str, reason: &str) -> GuardError {
    GuardError::ConfigInvalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Get the default config path
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docker-guard")
        .join("config.yaml")
}
