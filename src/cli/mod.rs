//! CLI module for direct command-line usage
//!
//! Every subcommand goes through the same validator and rate-limited
//! executor a library caller would use.

mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use runner::{
    ExecArgs, run_alternative, run_audit, run_check, run_exec, run_health, run_stats, run_suites,
};

/// Docker Guard - policy enforcement and rate limiting for docker in test tooling
#[derive(Parser)]
#[command(name = "docker-guard")]
#[command(about = "Blocks forced docker operations and rate-limits docker calls made by tests")]
#[command(version)]
#[command(after_help = "EXAMPLES:
    # Check whether a command would be allowed
    docker-guard check -- docker rm -f my_container

    # List the forbidden signatures and exceptions
    docker-guard check --list

    # Suggest a safe replacement for a forced command
    docker-guard alternative -- docker system prune -af

    # Run a docker command through the governance layer
    docker-guard exec --timeout 30 -- docker ps -a

    # Show the violation audit trail
    docker-guard audit --recent 20

    # Run the configured test suites, cleaning up in between
    docker-guard run --parallel --suite unit --suite integration")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON where a command has a text form
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Validate a command against the force-flag policy without running it
    Check {
        /// List the policy rules instead of checking a command
        #[arg(long)]
        list: bool,

        /// Command tokens, after `--`
        #[arg(last = true, required_unless_present = "list")]
        command: Vec<String>,
    },

    /// Print the safe alternative for a command
    Alternative {
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Execute a command through the rate-limited executor
    Exec {
        /// Timeout per attempt in seconds (defaults to the configured value)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Text written to the command's stdin
        #[arg(long)]
        stdin: Option<String>,

        /// Working directory for the command
        #[arg(short, long)]
        working_dir: Option<PathBuf>,

        /// Number of retries (defaults to the configured value)
        #[arg(long)]
        retries: Option<u32>,

        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Check that the docker daemon responds
    Health,

    /// Print executor statistics and the audit summary as JSON
    Stats {
        /// Probe the docker daemon first
        #[arg(long)]
        probe: bool,
    },

    /// Print the force-flag violation audit report as JSON
    Audit {
        /// Number of recent log lines to show
        #[arg(short, long)]
        recent: Option<usize>,
    },

    /// Run the configured test suites
    Run {
        /// Run parallel-safe suites concurrently
        #[arg(long)]
        parallel: bool,

        /// Run suites even when resources are short or docker is unhealthy
        #[arg(long)]
        force: bool,

        /// Only run these suites (repeatable)
        #[arg(short, long = "suite")]
        suites: Vec<String>,

        /// Print the execution plan and exit
        #[arg(long)]
        dry_run: bool,
    },
}
