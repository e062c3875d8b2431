//! Discard the most recent engine commits.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::info;

use crate::config::Config;
use crate::vcs::VcsGateway;

pub async fn run(count: u32) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    if count == 0 {
        bail!("Count must be greater than 0");
    }

    let config = Config::load(&cwd)?;
    let vcs = VcsGateway::new(&cwd, config.engine.command_timeout());
    if !vcs.is_repo().await {
        bail!("Not inside a git repository");
    }

    let log = vcs.log_oneline(count).await?;
    if !log.success {
        bail!("Failed to read git log: {}", log.output.trim());
    }

    println!(
        "\n{} Reverting the last {} commit(s):",
        "⚠".yellow(),
        count.to_string().cyan()
    );
    for line in log.output.lines() {
        println!("  {}", line.dimmed());
    }

    let reset = vcs.reset_to_before(count).await?;
    if !reset.success {
        bail!("Git reset failed: {}", reset.output.trim());
    }

    info!("Reverted {} commit(s)", count);
    println!(
        "\n{} Reverted {} commit(s).",
        "✓".green(),
        count.to_string().cyan()
    );
    println!("  {}", "Use 'git reflog' to recover if needed.".dimmed());

    Ok(())
}
