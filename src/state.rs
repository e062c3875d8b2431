use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const STATE_FILE: &str = ".evo/state.toml";

/// Persisted engine run-state.
///
/// `active` is the cooperative stop flag: `evo cancel` flips it and the
/// engine checks it between cycles. A started cycle always runs to a
/// terminal outcome first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub active: bool,
    /// Monotonic cycle counter across runs.
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_reason_code: Option<String>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            active: false,
            cycle: 0,
            started_at: Utc::now(),
            last_cycle_at: None,
            last_reason_code: None,
        }
    }
}

impl EngineState {
    /// Load state from file if it exists.
    pub fn load(project_dir: &Path) -> Result<Option<Self>> {
        let state_path = project_dir.join(STATE_FILE);

        if !state_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&state_path)
            .with_context(|| format!("Failed to read state file: {}", state_path.display()))?;

        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", state_path.display()))?;

        Ok(Some(state))
    }

    /// Load existing state or create a new one.
    pub fn load_or_create(project_dir: &Path) -> Result<Self> {
        Ok(Self::load(project_dir)?.unwrap_or_default())
    }

    /// Save state to file.
    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let state_path = project_dir.join(STATE_FILE);

        if let Some(parent) = state_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize state")?;

        fs::write(&state_path, content)
            .with_context(|| format!("Failed to write state file: {}", state_path.display()))?;

        Ok(())
    }

    /// Delete the state file, reporting whether it existed.
    pub fn delete(project_dir: &Path) -> Result<bool> {
        let state_path = project_dir.join(STATE_FILE);

        if state_path.exists() {
            fs::remove_file(&state_path).with_context(|| {
                format!("Failed to delete state file: {}", state_path.display())
            })?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
