use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod engine;
mod evolog;
mod ledger;
mod manifest;
mod patch;
mod plan;
mod planner;
mod promote;
mod queue;
mod sandbox;
mod state;
mod steps;
mod vcs;

#[derive(Parser)]
#[command(name = "evo")]
#[command(
    author,
    version,
    about = "Autonomous objective execution cycles - plan, validate in a sandbox, promote, commit"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize evo configuration in the current project
    Init {
        /// Force overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Queue an objective; the newest one runs first
    Submit {
        /// Natural-language description of the desired change
        objective: String,
    },

    /// Run queued objectives through execution cycles
    Run {
        /// Maximum number of cycles (0 = until the queue drains)
        #[arg(short, long, default_value = "0")]
        max_cycles: u64,

        /// Queue this objective before starting
        #[arg(short, long)]
        objective: Option<String>,
    },

    /// Show engine state, pending objectives, and recent outcomes
    Status,

    /// Stop a running engine after its current cycle
    Cancel,

    /// Discard the most recent engine commits
    Revert {
        /// Number of commits to revert
        #[arg(long, default_value = "1")]
        last: u32,
    },

    /// Remove engine state files
    Clean {
        /// Also remove evo.toml
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("evo=debug")
    } else {
        EnvFilter::new("evo=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force).await?;
        }
        Commands::Submit { objective } => {
            commands::submit::run(objective).await?;
        }
        Commands::Run {
            max_cycles,
            objective,
        } => {
            commands::run::run(max_cycles, objective).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Cancel => {
            commands::cancel::run().await?;
        }
        Commands::Revert { last } => {
            commands::revert::run(last).await?;
        }
        Commands::Clean { all } => {
            commands::clean::run(all).await?;
        }
    }

    Ok(())
}
