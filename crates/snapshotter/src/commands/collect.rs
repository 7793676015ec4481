//! Collect command - harvests a redacted workspace snapshot.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use snapshotter_harvest::{HarvestConfig, Harvester};
use snapshotter_slack::{SlackClient, TokenStore};

use super::Context;

/// Arguments for the collect command.
#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Directory holding tokens.json; the snapshot is written here too
    #[arg(long = "keys-file", value_name = "PATH", default_value = ".")]
    pub keys_file: PathBuf,
}

/// Run the collect command.
pub async fn run(args: CollectArgs, ctx: &Context) -> Result<()> {
    let store = TokenStore::in_dir(&args.keys_file);
    let harvester = Harvester::new(
        SlackClient::builder().build()?,
        HarvestConfig::new(&args.keys_file),
    );

    let dim = Style::new().dim();
    if ctx.verbose {
        println!("{} {}", dim.apply_to("Tokens:"), store.path().display());
    }
    println!("Collecting workspace snapshot...");

    let report = harvester
        .run_from_store(&store)
        .await
        .context("Snapshot collection failed")?;

    let green = Style::new().green().bold();
    println!();
    println!("{}", green.apply_to("Snapshot complete"));
    println!("  {} {}", dim.apply_to("Teams:   "), report.teams);
    println!("  {} {}", dim.apply_to("Members: "), report.members);
    println!("  {} {}", dim.apply_to("Channels:"), report.channels);
    println!("  {} {}", dim.apply_to("Messages:"), report.messages);
    println!(
        "  {} {}",
        dim.apply_to("Output:  "),
        harvester.config().output_dir.display()
    );
    println!();

    let yellow = Style::new().yellow();
    println!(
        "{}",
        yellow.apply_to(format!(
            "{} holds live member tokens. Delete it once you no longer need it.",
            store.path().display()
        ))
    );
    println!();

    Ok(())
}
