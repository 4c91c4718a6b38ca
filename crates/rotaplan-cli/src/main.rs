//! google-rotation-planner CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::warn;

use rotaplan_cli::cli::{Cli, Command};
use rotaplan_cli::commands::{auth, rota};
use rotaplan_cli::error::{CliError, CliResult};
use rotaplan_core::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.tracing_config()) {
        eprintln!("warning: {}", e);
    }

    let result = tokio::select! {
        result = run(cli) => result,
        () = interrupted() => Err(CliError::Interrupted),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    if let Some(command) = cli.command {
        let auth_config = cli.auth_config()?;
        return match command {
            Command::Init => auth::init(auth_config).await,
            Command::Reset => auth::reset(auth_config),
            Command::RefreshToken => auth::refresh(auth_config).await,
        };
    }

    let rota_config = rota::load(&cli.config)?;
    if cli.dry_run {
        return rota::dry_run(&rota_config);
    }

    let auth_config = cli.auth_config()?;
    if cli.cleanup {
        rota::cleanup(&rota_config, auth_config).await
    } else {
        rota::create(&rota_config, auth_config).await
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("unable to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
