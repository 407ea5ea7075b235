mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wgfleet_api::RestConnector;
use wgfleet_core::ConnectionSupervisor;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a router connection
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "wgfleet", &mut std::io::stdout());
            Ok(())
        }

        // All other commands require a router connection
        cmd => {
            let cfg = config::load_config()?;
            let device = config::resolve_device(&cli.global, &cfg)?;
            let connector = Arc::new(RestConnector::new(device.transport()));
            let supervisor = ConnectionSupervisor::new(device, connector);

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &supervisor, &cfg, &cli.global).await;
            supervisor.close().await;
            result
        }
    }
}
