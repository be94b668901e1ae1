//! `a3s-offline clean` command: cleanup-only modes.

use std::path::Path;

use a3s_offline_core::SyncConfig;
use a3s_offline_runtime::{CheckpointStore, ReportWriter, SnapshotStore};
use clap::{Args, CommandFactory};

use crate::logging::LOG_FILE_PREFIX;

#[derive(Args, Default)]
pub struct CleanArgs {
    /// Remove the checkpoint file
    #[arg(long)]
    pub state: bool,

    /// Remove exported image archives
    #[arg(long)]
    pub output: bool,

    /// Remove today's snapshot and update lists (history is kept)
    #[arg(long)]
    pub versions: bool,

    /// Remove log files
    #[arg(long)]
    pub logs: bool,

    /// Remove run reports and retry scripts
    #[arg(long)]
    pub reports: bool,

    /// All of the above
    #[arg(long)]
    pub all: bool,
}

impl CleanArgs {
    fn nothing_selected(&self) -> bool {
        !(self.state || self.output || self.versions || self.logs || self.reports || self.all)
    }
}

pub fn execute(args: CleanArgs, config: &SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    if args.nothing_selected() {
        let mut command = super::Cli::command();
        if let Some(clean) = command.find_subcommand_mut("clean") {
            clean.print_help()?;
        }
        return Ok(());
    }

    let today = chrono::Local::now().format("%Y%m%d").to_string();
    for line in clean(&args, config, &today)? {
        println!("{line}");
    }
    Ok(())
}

/// Perform the selected cleanups. Returns one message per action taken.
pub fn clean(
    args: &CleanArgs,
    config: &SyncConfig,
    today: &str,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut done = Vec::new();

    if args.state || args.all {
        let store = CheckpointStore::new(config.state_file.clone());
        if store.clear()? {
            done.push(format!("Removed checkpoint {}", store.path().display()));
        }
    }

    if args.output || args.all {
        let images_dir = config.images_dir();
        if images_dir.exists() {
            std::fs::remove_dir_all(&images_dir)?;
            done.push(format!("Removed {}", images_dir.display()));
        }
    }

    if args.versions || args.all {
        let removed = SnapshotStore::new(config.versions_dir()).remove_for_date(today)?;
        if !removed.is_empty() {
            done.push(format!("Removed {} version file(s) for {}", removed.len(), today));
        }
    }

    if args.logs || args.all {
        let removed = remove_logs(&config.logs_dir)?;
        if removed > 0 {
            done.push(format!("Removed {} log file(s)", removed));
        }
    }

    if args.reports || args.all {
        let removed = ReportWriter::new(config.reports_dir()).clear()?;
        if removed > 0 {
            done.push(format!("Removed {} report file(s)", removed));
        }
    }

    if done.is_empty() {
        done.push("Nothing to clean".to_string());
    }
    tracing::info!(actions = done.len(), "Cleanup finished");
    Ok(done)
}

fn remove_logs(logs_dir: &Path) -> std::io::Result<usize> {
    if !logs_dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(logs_dir)? {
        let entry = entry?;
        let is_log = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if is_log && entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
