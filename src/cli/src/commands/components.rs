//! `a3s-offline components` command.

use a3s_offline_core::SyncConfig;
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct ComponentsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: ComponentsArgs, config: &SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(&config.components)?);
        return Ok(());
    }

    println!("{}", output::components_table(&config.components));
    println!();
    println!(
        "{} component(s), architectures: {}",
        config.components.len(),
        config.architectures.join(", ")
    );
    Ok(())
}
