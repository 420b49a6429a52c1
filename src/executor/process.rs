//! Process launching with `tokio::process`

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{GuardError, Result};
use crate::ports::{ProcessOptions, ProcessOutput, ProcessRunner};

/// Default cap for each captured stream
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Runs programs directly (never through a shell).
///
/// The child is killed when the timeout fires.
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    max_output_bytes: usize,
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self {
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl TokioProcessRunner {
    #[must_use]
    pub const fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        if bytes.len() <= self.max_output_bytes {
            return String::from_utf8_lossy(bytes).into_owned();
        }
        let mut text = String::from_utf8_lossy(&bytes[..self.max_output_bytes]).into_owned();
        text.push_str(&format!(
            "\n[output truncated: {} of {} bytes shown]",
            self.max_output_bytes,
            bytes.len()
        ));
        text
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        command: &[String],
        options: &ProcessOptions,
        timeout: Duration,
    ) -> Result<ProcessOutput> {
        let line = command.join(" ");
        let Some((program, args)) = command.split_first() else {
            return Err(GuardError::ProcessFailure {
                command: line,
                exit_code: None,
                reason: "empty command".to_string(),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if options.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }
        cmd.envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| GuardError::ProcessFailure {
            command: line.clone(),
            exit_code: None,
            reason: format!("failed to start: {e}"),
        })?;

        // The stdin write shares the deadline with the wait and runs alongside
        // it, so output keeps draining while the payload is fed
        let stdin = child.stdin.take();
        let feed = async {
            if let (Some(payload), Some(mut stdin)) = (&options.stdin, stdin) {
                // A child that exits without reading stdin is not an error
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    debug!(command = %line, error = %e, "Child closed stdin early");
                }
            }
        };
        let run = async {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let result = tokio::time::timeout(timeout, run).await;
        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(GuardError::ProcessFailure {
                    command: line,
                    exit_code: None,
                    reason: format!("failed to collect output: {e}"),
                });
            }
            Err(_) => {
                debug!(command = %line, timeout = ?timeout, "Process timed out, killed");
                return Err(GuardError::ProcessTimeout {
                    command: line,
                    timeout,
                });
            }
        };

        Ok(ProcessOutput {
            // Killed by a signal
            exit_code: output.status.code().unwrap_or(-1),
            stdout: self.decode(&output.stdout),
            stderr: self.decode(&output.stderr),
            duration: start.elapsed(),
        })
    }
}
