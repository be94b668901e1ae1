//! `a3s-offline check` command: dry-run version diff.

use a3s_offline_core::SyncConfig;
use a3s_offline_runtime::SyncRunner;
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct CheckArgs {
    /// Only print the references that would be exported
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(args: CheckArgs, config: SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runner = SyncRunner::from_config(config)?;
    let reconciliation = runner.check().await?;

    if args.quiet {
        for planned in reconciliation.update_set.values() {
            for reference in planned.references() {
                println!("{reference}");
            }
        }
        return Ok(());
    }

    println!("{}", output::status_table(&reconciliation.rows));
    println!();
    match reconciliation.prior {
        Some(ref prior) => println!("Compared against snapshot {}", prior.run_key),
        None => println!("No previous snapshot; every resolved version counts as an update"),
    }
    let updates: usize = reconciliation
        .update_set
        .values()
        .map(|p| p.versions.len())
        .sum();
    if updates == 0 {
        println!("All components are up to date");
    } else {
        println!(
            "{} version(s) across {} component(s) would be exported",
            updates,
            reconciliation.update_set.len()
        );
    }
    Ok(())
}
