//! Queue an objective for the engine.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::info;

use crate::queue::{Objective, ObjectiveQueue};

pub async fn run(text: String) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    let text = text.trim().to_string();
    if text.is_empty() {
        bail!("Objective text cannot be empty");
    }

    let queue = ObjectiveQueue::load(&cwd)?;
    queue.push(Objective::new(text.clone()));
    queue.save(&cwd)?;

    info!("Objective queued ({} pending)", queue.len());
    println!(
        "\n{} Queued: {}",
        "✓".green(),
        first_line(&text).cyan()
    );
    println!(
        "  {} objective(s) pending. It runs {} (newest first).",
        queue.len().to_string().cyan(),
        "next".bold()
    );

    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("one\ntwo"), "one");
        assert_eq!(first_line("single"), "single");
    }
}
