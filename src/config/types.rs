use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::executor::RetryConfig;
use crate::security::{DEFAULT_GOVERNED_PROGRAMS, DEFAULT_RECENT_WINDOW};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub governance: GovernanceConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub suites: Vec<SuiteConfig>,
}

/// Settings of the policy validator, auditor and rate-limited executor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GovernanceConfig {
    /// Minimum spacing between two process starts
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Maximum number of docker processes in flight
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u64,

    /// Program names (basenames) subject to the force-flag policy
    #[serde(default = "default_governed_programs")]
    pub governed_programs: Vec<String>,

    /// Violation log file (`~` is expanded). Defaults to the user's local
    /// data directory.
    #[serde(default)]
    pub audit_log_path: Option<String>,

    /// Number of log lines shown as recent violations
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            default_timeout_seconds: default_timeout_seconds(),
            governed_programs: default_governed_programs(),
            audit_log_path: None,
            recent_window: default_recent_window(),
        }
    }
}

impl GovernanceConfig {
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds)
    }

    /// Create a `RetryConfig` from these settings
    #[must_use]
    pub const fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// Resolved violation log location
    #[must_use]
    pub fn audit_log_path(&self) -> Option<PathBuf> {
        self.audit_log_path.as_ref().map_or_else(
            || {
                dirs::data_local_dir()
                    .map(|dir| dir.join("docker-guard").join("force_flag_violations.log"))
            },
            |path| Some(PathBuf::from(shellexpand::tilde(path).as_ref())),
        )
    }
}

const fn default_min_interval_ms() -> u64 {
    500
}

const fn default_max_concurrent() -> usize {
    3
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_base_backoff_ms() -> u64 {
    1000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_timeout_seconds() -> u64 {
    60
}

fn default_governed_programs() -> Vec<String> {
    DEFAULT_GOVERNED_PROGRAMS
        .iter()
        .map(ToString::to_string)
        .collect()
}

const fn default_recent_window() -> usize {
    DEFAULT_RECENT_WINDOW
}

/// Test-suite driver settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Run consecutive `parallel_safe` suites together
    #[serde(default)]
    pub parallel: bool,

    #[serde(default = "default_max_parallel_suites")]
    pub max_parallel_suites: usize,

    /// Run suites even when resources look insufficient or the daemon is
    /// unhealthy
    #[serde(default)]
    pub force: bool,

    /// Explicit suite order by name. Empty means by ascending priority.
    #[serde(default)]
    pub order: Vec<String>,

    /// Name prefixes of containers, networks and volumes created by test runs
    #[serde(default = "default_cleanup_prefixes")]
    pub cleanup_prefixes: Vec<String>,

    /// Remove leftover test resources after each suite
    #[serde(default = "default_true")]
    pub cleanup_between_suites: bool,

    /// Probe the docker daemon before the first suite
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_parallel_suites: default_max_parallel_suites(),
            force: false,
            order: Vec::new(),
            cleanup_prefixes: default_cleanup_prefixes(),
            cleanup_between_suites: true,
            health_check: true,
        }
    }
}

const fn default_max_parallel_suites() -> usize {
    2
}

fn default_cleanup_prefixes() -> Vec<String> {
    vec!["test_".to_string(), "test-".to_string()]
}

const fn default_true() -> bool {
    true
}

/// One test suite
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SuiteConfig {
    pub name: String,

    /// Program and arguments, run without a shell
    pub command: Vec<String>,

    /// Lower runs first
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// May run alongside other parallel-safe suites
    #[serde(default)]
    pub parallel_safe: bool,

    #[serde(default = "default_suite_timeout")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub requirements: ResourceRequirements,

    /// Extra cleanup prefixes for this suite's resources
    #[serde(default)]
    pub cleanup_prefixes: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub working_dir: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl SuiteConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

const fn default_priority() -> i32 {
    100
}

const fn default_suite_timeout() -> u64 {
    1800
}

/// Host resources a suite needs before it may start (0 = no requirement)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub memory_mb: u64,

    #[serde(default)]
    pub cpus: usize,
}
