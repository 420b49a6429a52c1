use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use docker_guard::GuardError;
use docker_guard::cli::{
    Cli, Commands, ExecArgs, run_alternative, run_audit, run_check, run_exec, run_health, run_stats,
    run_suites,
};
use docker_guard::config::load_or_default;
use docker_guard::executor::RateLimitedExecutor;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays usable for command output and JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(code) => exit_code(code),
        Err(e) => {
            error!("{e:#}");
            let code = e
                .downcast_ref::<GuardError>()
                .map_or(docker_guard::error::EXIT_FAILURE, GuardError::exit_code);
            exit_code(code)
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let executor = RateLimitedExecutor::from_config(&config.governance)
        .context("Failed to open the violation audit log")?
        .with_cancellation(cancel.clone());
    let executor = Arc::new(executor);

    info!(
        min_interval_ms = config.governance.min_interval_ms,
        max_concurrent = config.governance.max_concurrent,
        suites = config.suites.len(),
        "Configuration loaded"
    );

    let json = cli.json;
    let code = match cli.command {
        Commands::Check { list, command } => run_check(&executor, list, &command, json)?,
        Commands::Alternative { command } => run_alternative(&executor, &command),
        Commands::Exec {
            timeout,
            stdin,
            working_dir,
            retries,
            command,
        } => {
            let args = ExecArgs {
                command,
                timeout,
                stdin,
                working_dir,
                retries,
            };
            run_exec(&executor, args, json).await?
        }
        Commands::Health => run_health(&executor, json).await?,
        Commands::Stats { probe } => run_stats(&executor, probe).await?,
        Commands::Audit { recent } => run_audit(&executor, recent)?,
        Commands::Run {
            parallel,
            force,
            suites,
            dry_run,
        } => {
            config.orchestrator.parallel |= parallel;
            config.orchestrator.force |= force;
            run_suites(&config, executor, cancel, &suites, dry_run, json).await?
        }
    };
    Ok(code)
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after in-flight docker calls");
            cancel.cancel();
        }
    });
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
