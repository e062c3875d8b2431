use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::plan::ValidationStrategy;

const CONFIG_FILE: &str = "evo.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub git: GitConfig,
    /// Strategy key → ordered validation steps plus optional sanity check.
    #[serde(default = "default_strategies")]
    pub strategies: BTreeMap<String, ValidationStrategy>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            planner: PlannerConfig::default(),
            commands: CommandsConfig::default(),
            git: GitConfig::default(),
            strategies: default_strategies(),
        }
    }
}

/// Core cycle-engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Consecutive failures on the identical objective text before it is
    /// discarded permanently.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    /// Maximum entries retained in the outcome ledger.
    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,

    /// Timeout applied to every blocking external call (git, validation
    /// commands, planner commands).
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Push a planner-proposed follow-up objective after each success.
    #[serde(default)]
    pub self_generate: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            ledger_capacity: default_ledger_capacity(),
            command_timeout_secs: default_command_timeout(),
            self_generate: false,
        }
    }
}

impl EngineConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// External planner and strategy-selector commands.
///
/// Each command receives a JSON request on stdin and must print a JSON
/// response on stdout. Empty means "not configured".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Produces an action plan for `{objective, manifest}`.
    #[serde(default)]
    pub plan_command: String,

    /// Maps an action plan to `{strategy_key}` or `CAPACITATION_REQUIRED`.
    #[serde(default)]
    pub select_command: String,

    /// Proposes the next evolutionary objective after a success.
    #[serde(default)]
    pub next_objective_command: String,
}

/// Commands run by the command-backed validation steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Syntax check, run from the step's base path.
    #[serde(default = "default_syntax_command")]
    pub syntax_check: String,

    /// Test runner, run from the step's base path.
    #[serde(default = "default_test_command")]
    pub tests: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            syntax_check: default_syntax_command(),
            tests: default_test_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Commit fully-validated cycles automatically.
    #[serde(default = "default_true")]
    pub auto_commit: bool,

    /// Prefix for generated commit messages.
    #[serde(default = "default_commit_prefix")]
    pub commit_prefix: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            auto_commit: true,
            commit_prefix: default_commit_prefix(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_failure_threshold() -> usize {
    3
}

fn default_ledger_capacity() -> usize {
    500
}

fn default_command_timeout() -> u64 {
    600
}

fn default_syntax_command() -> String {
    "python3 -m compileall -q .".to_string()
}

fn default_test_command() -> String {
    "python3 -m pytest -q".to_string()
}

fn default_commit_prefix() -> String {
    "evo:".to_string()
}

fn default_strategies() -> BTreeMap<String, ValidationStrategy> {
    let mut strategies = BTreeMap::new();
    strategies.insert(
        "full_validation".to_string(),
        ValidationStrategy {
            steps: vec![
                "apply_patches_to_disk".to_string(),
                "check_syntax".to_string(),
                "run_tests".to_string(),
            ],
            sanity_check_step: Some("run_tests".to_string()),
        },
    );
    strategies.insert(
        "syntax_only".to_string(),
        ValidationStrategy {
            steps: vec![
                "apply_patches_to_disk".to_string(),
                "check_syntax".to_string(),
            ],
            sanity_check_step: None,
        },
    );
    strategies.insert(
        "read_only_check".to_string(),
        ValidationStrategy {
            steps: vec!["run_tests".to_string()],
            sanity_check_step: None,
        },
    );
    strategies
}

impl Config {
    /// Load configuration from `evo.toml`, using defaults if absent.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }

    /// Resolve a strategy key from the configuration table.
    pub fn strategy(&self, key: &str) -> Option<&ValidationStrategy> {
        self.strategies.get(key)
    }
}
