//! a3s-offline CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use a3s_offline_cli::commands::{dispatch, Cli};
use a3s_offline_cli::logging::init_logging;
use a3s_offline_core::SyncConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match SyncConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_logging(&config.logs_dir, cli.debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = dispatch(cli.command, config) => match result {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                tracing::error!(error = %e, "Run aborted");
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, the checkpoint is kept for the next run");
            eprintln!("Interrupted");
            ExitCode::FAILURE
        }
    }
}
