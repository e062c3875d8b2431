//! Remove engine state files.
//!
//! Core logic determines which files to remove based on existence.
//! Formatting is pure. IO happens only at the top level.

use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

/// Files removed by a plain clean.
fn state_files() -> Vec<PathBuf> {
    vec![
        PathBuf::from(".evo/state.toml"),
        PathBuf::from(".evo/queue.json"),
        PathBuf::from(".evo/ledger.json"),
        PathBuf::from(".evo/evolution.csv"),
    ]
}

/// Additional files removed with --all.
fn config_files() -> Vec<PathBuf> {
    vec![PathBuf::from("evo.toml")]
}

fn files_to_clean<E>(all: bool, exists: E) -> Vec<PathBuf>
where
    E: Fn(&Path) -> bool,
{
    let mut files = state_files();
    if all {
        files.extend(config_files());
    }
    files.into_iter().filter(|f| exists(f)).collect()
}

fn clean_files<E, R>(all: bool, exists: E, mut remove: R) -> Result<Vec<PathBuf>>
where
    E: Fn(&Path) -> bool,
    R: FnMut(&Path) -> Result<()>,
{
    let to_remove = files_to_clean(all, &exists);
    let mut removed = Vec::new();
    for file in to_remove {
        remove(&file)?;
        removed.push(file);
    }
    Ok(removed)
}

fn format_results(removed: &[PathBuf]) -> String {
    let mut out = String::new();
    if removed.is_empty() {
        writeln!(&mut out, "\n{} No engine files found to clean.", "ℹ".blue()).unwrap();
    } else {
        writeln!(&mut out, "\n{} Cleaned engine files:", "✓".green()).unwrap();
        for file in removed {
            writeln!(
                &mut out,
                "  {} {}",
                "✗".red(),
                file.display().to_string().dimmed()
            )
            .unwrap();
        }
    }
    out
}

pub async fn run(all: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    let removed = clean_files(
        all,
        |path| cwd.join(path).exists(),
        |path| {
            fs::remove_file(cwd.join(path))
                .with_context(|| format!("Failed to remove {}", path.display()))
        },
    )?;

    print!("{}", format_results(&removed));
    Ok(())
}
