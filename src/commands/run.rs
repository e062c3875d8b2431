//! Start the objective execution engine.

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

use crate::config::Config;
use crate::engine::{CycleEngine, EngineContext};
use crate::queue::Objective;

pub async fn run(max_cycles: u64, objective: Option<String>) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    let config = Config::load(&cwd)?;
    let ctx = EngineContext::initialize(&cwd, config)?;
    if let Some(text) = objective.map(|o| o.trim().to_string()).filter(|o| !o.is_empty()) {
        ctx.queue.push(Objective::new(text));
        ctx.queue.save(&cwd)?;
    }
    if ctx.queue.is_empty() {
        println!(
            "\n{} The objective queue is empty. Use {} first.",
            "ℹ".blue(),
            "evo submit".green()
        );
        return Ok(());
    }

    let limit = (max_cycles > 0).then_some(max_cycles);
    println!(
        "\n{} Starting engine: {} objective(s) queued, {}.",
        "▶".green().bold(),
        ctx.queue.len().to_string().cyan(),
        limit
            .map(|n| format!("up to {n} cycle(s)"))
            .unwrap_or_else(|| "no cycle limit".to_string())
            .cyan()
    );

    let mut engine = CycleEngine::new(ctx)?;
    let summary = engine.run(limit).await?;

    info!("Run finished after {} cycle(s)", summary.cycles_run);
    println!(
        "\n{} Run finished: {} cycle(s), last outcome {}.",
        "✓".green(),
        summary.cycles_run.to_string().cyan(),
        summary
            .last_reason_code
            .as_deref()
            .unwrap_or("-")
            .cyan()
    );
    if !engine.context().queue.is_empty() {
        println!(
            "  {} objective(s) still pending; run {} to continue.",
            engine.context().queue.len().to_string().cyan(),
            "evo run".green()
        );
    }

    Ok(())
}
