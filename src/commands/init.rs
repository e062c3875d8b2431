//! Initialize evo configuration in a project directory.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

const EVO_TOML: &str = r#"# evo project configuration

[engine]
# Consecutive failures on the same objective before it is discarded.
failure_threshold = 3
# Seconds before any external command is killed.
command_timeout_secs = 600
# Queue a planner-proposed follow-up objective after each success.
self_generate = false

[planner]
# Commands exchanging JSON over stdin/stdout. plan_command is required
# before `evo run` will start.
plan_command = ""
select_command = ""
next_objective_command = ""

[commands]
syntax_check = "python3 -m compileall -q ."
tests = "python3 -m pytest -q"

[git]
auto_commit = true
commit_prefix = "evo:"

[strategies.full_validation]
steps = ["apply_patches_to_disk", "check_syntax", "run_tests"]
sanity_check = "run_tests"

[strategies.syntax_only]
steps = ["apply_patches_to_disk", "check_syntax"]

[strategies.read_only_check]
steps = ["run_tests"]
"#;

const GITIGNORE_LINE: &str = ".evo/";

/// What happened to each file init touched.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InitChange {
    Created(String),
    Skipped(String),
    Appended(String),
}

pub async fn run(force: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    info!("Initializing evo in {}", cwd.display());

    let changes = init_project(&cwd, force)?;
    print!("{}", format_changes(&changes));
    Ok(())
}

fn init_project(root: &Path, force: bool) -> Result<Vec<InitChange>> {
    let mut changes = Vec::new();

    let config_path = root.join("evo.toml");
    if config_path.exists() && !force {
        changes.push(InitChange::Skipped("evo.toml".to_string()));
    } else {
        fs::write(&config_path, EVO_TOML).context("Failed to write evo.toml")?;
        changes.push(InitChange::Created("evo.toml".to_string()));
    }

    fs::create_dir_all(root.join(".evo")).context("Failed to create .evo directory")?;
    changes.push(InitChange::Created(".evo/".to_string()));

    // Engine state never belongs in the project's history.
    let gitignore = root.join(".gitignore");
    let existing = if gitignore.exists() {
        fs::read_to_string(&gitignore).context("Failed to read .gitignore")?
    } else {
        String::new()
    };
    if existing.lines().any(|l| l.trim() == GITIGNORE_LINE) {
        changes.push(InitChange::Skipped(".gitignore".to_string()));
    } else {
        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(GITIGNORE_LINE);
        updated.push('\n');
        fs::write(&gitignore, updated).context("Failed to update .gitignore")?;
        changes.push(InitChange::Appended(".gitignore".to_string()));
    }

    Ok(changes)
}

fn format_changes(changes: &[InitChange]) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    writeln!(&mut out, "\n{} evo initialized.\n", "✓".green().bold()).unwrap();
    for change in changes {
        match change {
            InitChange::Created(path) => {
                writeln!(&mut out, "  {} created", path.cyan()).unwrap();
            }
            InitChange::Appended(path) => {
                writeln!(&mut out, "  {} updated", path.cyan()).unwrap();
            }
            InitChange::Skipped(path) => {
                writeln!(
                    &mut out,
                    "  {} {} (already present, use --force to overwrite)",
                    "⊘".yellow(),
                    path
                )
                .unwrap();
            }
        }
    }

    writeln!(&mut out, "\n{}", "Next steps:".yellow().bold()).unwrap();
    writeln!(
        &mut out,
        "  1. Set {} in evo.toml to your planner command",
        "[planner].plan_command".cyan()
    )
    .unwrap();
    writeln!(
        &mut out,
        "  2. Queue work with {}",
        "evo submit \"<objective>\"".green()
    )
    .unwrap();
    writeln!(&mut out, "  3. Start the engine with {}", "evo run".green()).unwrap();

    out
}
