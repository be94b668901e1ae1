//! `a3s-offline run` command: resolve, reconcile, export, report.

use std::path::PathBuf;

use a3s_offline_core::SyncConfig;
use a3s_offline_runtime::{RunOptions, RunOutcome, SyncRunner};
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct RunArgs {
    /// Concurrent pull/export workers
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Container runtime binary (e.g., docker, podman)
    #[arg(long)]
    pub runtime: Option<String>,

    /// Data directory holding versions/, images/ and reports/
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Discard an existing checkpoint instead of resuming it
    #[arg(long)]
    pub fresh: bool,
}

impl RunArgs {
    /// Layer the flags over the loaded configuration.
    pub fn apply(&self, config: &mut SyncConfig) -> a3s_offline_core::Result<()> {
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(ref runtime) = self.runtime {
            config.runtime_binary = runtime.clone();
        }
        if let Some(ref data_dir) = self.data_dir {
            config.data_dir = data_dir.clone();
        }
        config.validate()
    }
}

pub async fn execute(
    args: RunArgs,
    mut config: SyncConfig,
) -> Result<bool, Box<dyn std::error::Error>> {
    args.apply(&mut config)?;

    let runner = SyncRunner::from_config(config)?;
    let outcome = runner.run(RunOptions { fresh: args.fresh }).await?;
    print_outcome(&outcome);

    Ok(outcome.is_success())
}

fn print_outcome(outcome: &RunOutcome) {
    let report = &outcome.report;

    if let Some(ref reconciliation) = outcome.reconciliation {
        println!("{}", output::status_table(&reconciliation.rows));
        println!();
    }
    if let Some(ref stage) = report.resumed_from {
        println!("Resumed run {} from stage {}", report.run_key, stage);
    }

    if report.total == 0 {
        println!("All components are up to date");
    } else {
        if !report.results.is_empty() {
            println!("{}", output::export_table(&report.results));
            println!();
        }
        println!(
            "Exported {}/{} image archives ({} failed) in {}",
            report.succeeded,
            report.total,
            report.failed,
            output::format_duration(report.duration_secs)
        );
        if !report.validation.is_complete() {
            println!(
                "Validation: {} missing, {} unexpected archive(s)",
                report.validation.missing.len(),
                report.validation.unexpected.len()
            );
        }
    }

    if let Some(ref script) = report.remediation_script {
        println!("Retry failed images with: {}", script.display());
    }
    println!("Report: {}", outcome.report_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RunArgs,
    }

    #[test]
    fn test_flags_override_config() {
        let cli = TestCli::try_parse_from([
            "run",
            "--concurrency",
            "4",
            "--runtime",
            "podman",
            "--data-dir",
            "/srv/offline",
            "--fresh",
        ])
        .unwrap();
        let mut config = SyncConfig::default();
        cli.args.apply(&mut config).unwrap();

        assert_eq!(config.concurrency, 4);
        assert_eq!(config.runtime_binary, "podman");
        assert_eq!(config.data_dir, PathBuf::from("/srv/offline"));
        assert!(cli.args.fresh);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let cli = TestCli::try_parse_from(["run"]).unwrap();
        let mut config = SyncConfig::default();
        cli.args.apply(&mut config).unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.runtime_binary, "docker");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let cli = TestCli::try_parse_from(["run", "--concurrency", "0"]).unwrap();
        let mut config = SyncConfig::default();
        assert!(cli.args.apply(&mut config).is_err());
    }
}
