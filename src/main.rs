use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use proverd::api::HttpJobSource;
use proverd::config::Config;
use proverd::error::{ProverError, Result};
use proverd::isolation::{self, IsolatedProver};
use proverd::node::{ComputeMode, Runtime};
use proverd::prover::LocalEngine;
use proverd::shutdown;

#[derive(Parser, Debug)]
#[command(name = "proverd")]
#[command(version)]
#[command(about = "Resilient proof-computation client")]
struct Args {
    /// Path to the JSON config file
    #[arg(short = 'c', long, default_value = "config.json")]
    config: PathBuf,

    /// Run each proof in a disposable subprocess for memory and crash
    /// containment
    #[arg(short = 'p', long)]
    process_isolation: bool,

    /// Compute mode: read a request file, write a response file, exit.
    /// Used by the process-isolation subprocess invocation.
    #[arg(long, hide = true)]
    prove: bool,

    /// Request file path for compute mode
    #[arg(long, hide = true, requires = "prove")]
    request: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Subprocess compute mode: no logging, no network, no runtime state.
    if args.prove {
        let request = args.request.ok_or_else(|| {
            ProverError::Config("compute mode requires a request file path (--request)".into())
        })?;
        isolation::run_prove_mode(&LocalEngine, &request)?;
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load(&args.config)?;
    tracing::info!(
        config = %args.config.display(),
        nodes = ?config.node_ids,
        request_delay = config.request_delay,
        workers = config.prover_workers,
        queue_capacity = config.task_queue_capacity,
        "Loaded configuration"
    );

    let source = Arc::new(HttpJobSource::new(&config.orchestrator_url)?);

    let mode = if args.process_isolation {
        tracing::info!("Process isolation enabled");
        let exec = std::env::current_exe()?;
        ComputeMode::Isolated(Arc::new(IsolatedProver::new(
            exec,
            Duration::from_secs(config.max_lifetime),
            config.max_restarts,
        )))
    } else {
        ComputeMode::Local(Arc::new(LocalEngine))
    };

    let token = shutdown::token_on(shutdown::signal_received());
    Runtime::new(config, source).run(mode, token).await?;

    Ok(())
}
