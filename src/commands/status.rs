//! Show engine state, pending objectives, and recent outcomes.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::Config;
use crate::ledger::{FailureLedger, OutcomeStatus};
use crate::queue::ObjectiveQueue;
use crate::state::EngineState;

const SHOWN_OBJECTIVES: usize = 5;
const SHOWN_OUTCOMES: usize = 5;

pub async fn run() -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    let config = Config::load(&cwd)?;
    let queue = ObjectiveQueue::load(&cwd)?;
    let ledger = FailureLedger::load(&cwd, config.engine.ledger_capacity)?;

    println!("\n{}", "━".repeat(50).dimmed());
    println!("{}", "   evo engine status".yellow().bold());
    println!("{}", "━".repeat(50).dimmed());

    match EngineState::load(&cwd)? {
        Some(state) => {
            let active = if state.active {
                "running".green().bold()
            } else {
                "idle".red()
            };
            println!("  Engine:      {active}");
            println!("  Cycles:      {}", state.cycle.to_string().cyan());
            if let Some(last) = state.last_cycle_at {
                println!(
                    "  Last cycle:  {}",
                    last.format("%Y-%m-%d %H:%M:%S UTC").to_string().cyan()
                );
            }
            if let Some(reason) = &state.last_reason_code {
                println!("  Last reason: {}", reason.cyan());
            }
        }
        None => println!("  Engine:      {} (never run)", "idle".red()),
    }

    println!("  Queued:      {}", queue.len().to_string().cyan());
    let pending = queue.snapshot();
    for objective in pending.iter().rev().take(SHOWN_OBJECTIVES) {
        let line = objective.text.lines().next().unwrap_or("");
        println!("    - {}", line.dimmed());
    }
    if pending.len() > SHOWN_OBJECTIVES {
        println!(
            "    ... and {} more",
            (pending.len() - SHOWN_OBJECTIVES).to_string().dimmed()
        );
    }

    if !ledger.is_empty() {
        println!("  Recent outcomes:");
        for entry in ledger.tail(SHOWN_OUTCOMES) {
            let mark = match entry.status {
                OutcomeStatus::Success => "✓".green(),
                OutcomeStatus::Failure => "✗".red(),
            };
            let line = entry.objective.lines().next().unwrap_or("");
            println!("    {mark} {} {}", entry.reason_code.cyan(), line.dimmed());
        }
    }

    println!("{}", "━".repeat(50).dimmed());
    Ok(())
}
