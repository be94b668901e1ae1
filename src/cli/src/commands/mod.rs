//! CLI command definitions and dispatch.

mod check;
mod clean;
mod components;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use a3s_offline_core::SyncConfig;

/// a3s-offline - keep an offline mirror of container images current.
#[derive(Parser)]
#[command(name = "a3s-offline", version, about)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'D', long, global = true)]
    pub debug: bool,

    /// Configuration file (defaults to ./a3s-offline.yaml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Resolve versions, export updated images and write the report
    Run(run::RunArgs),
    /// Show which components have newer versions without exporting anything
    Check(check::CheckArgs),
    /// Remove checkpoint, output, snapshots, logs or reports
    Clean(clean::CleanArgs),
    /// List configured components
    Components(components::ComponentsArgs),
}

/// Dispatch a parsed command. `Ok(false)` means the command ran but some
/// work failed.
pub async fn dispatch(
    command: Command,
    config: SyncConfig,
) -> Result<bool, Box<dyn std::error::Error>> {
    match command {
        Command::Run(args) => run::execute(args, config).await,
        Command::Check(args) => check::execute(args, config).await.map(|()| true),
        Command::Clean(args) => clean::execute(args, &config).map(|()| true),
        Command::Components(args) => components::execute(args, &config).map(|()| true),
    }
}
