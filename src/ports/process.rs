//! Process Runner Port
//!
//! Abstracts launching an external program so the executor and the
//! orchestrator can be driven by a scripted runner in tests.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Extra settings for a single process launch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Written to the child's stdin, which is then closed
    pub stdin: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

/// Captured output of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Launches a program and waits for it.
///
/// A non-zero exit is reported through [`ProcessOutput::exit_code`], not as
/// an error. Implementations return [`GuardError::ProcessTimeout`] when the
/// deadline passes (the child must be killed) and
/// [`GuardError::ProcessFailure`] when the program cannot be started.
///
/// [`GuardError::ProcessTimeout`]: crate::error::GuardError::ProcessTimeout
/// [`GuardError::ProcessFailure`]: crate::error::GuardError::ProcessFailure
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: &[String],
        options: &ProcessOptions,
        timeout: Duration,
    ) -> Result<ProcessOutput>;
}
