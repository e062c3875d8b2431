//! The objective queue: a thread-safe LIFO stack of pending objectives.
//!
//! Producers (the CLI `submit` command, the engine's correction and
//! follow-up pushes) may enqueue at any time; the engine's single consumer
//! drains it one objective per cycle. Persisted to `.evo/queue.json` so
//! submissions survive between runs.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const QUEUE_FILE: &str = ".evo/queue.json";

/// A natural-language description of a desired code change.
///
/// The text is opaque to the engine apart from exact-equality comparison
/// for degenerate-loop detection. Correction objectives carry a marker line
/// so external planners can recognize repair work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Objective {
    pub text: String,
    pub submitted_at: DateTime<Utc>,
}

impl Objective {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            submitted_at: Utc::now(),
        }
    }

    /// True when this objective was synthesized to repair a failed attempt.
    pub fn is_correction(&self) -> bool {
        self.text.starts_with(CORRECTION_MARKER)
    }
}

/// Marker line prefixed to synthesized correction objectives.
pub const CORRECTION_MARKER: &str = "[fix-attempt]";

/// LIFO queue of objectives with interior locking.
#[derive(Debug, Default)]
pub struct ObjectiveQueue {
    stack: Mutex<Vec<Objective>>,
}

impl ObjectiveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes an objective; it becomes the next one popped.
    pub fn push(&self, objective: Objective) {
        self.stack.lock().expect("queue lock poisoned").push(objective);
    }

    /// Pops the most recently pushed objective.
    pub fn pop(&self) -> Option<Objective> {
        self.stack.lock().expect("queue lock poisoned").pop()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.lock().expect("queue lock poisoned").is_empty()
    }

    pub fn len(&self) -> usize {
        self.stack.lock().expect("queue lock poisoned").len()
    }

    /// Snapshot of pending objectives, bottom of the stack first.
    pub fn snapshot(&self) -> Vec<Objective> {
        self.stack.lock().expect("queue lock poisoned").clone()
    }

    /// Load the persisted queue, empty if the file does not exist.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = queue_path(project_dir);
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read queue file: {}", path.display()))?;
        let stack: Vec<Objective> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse queue file: {}", path.display()))?;

        Ok(Self {
            stack: Mutex::new(stack),
        })
    }

    /// Persist the queue to disk.
    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let path = queue_path(project_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let stack = self.stack.lock().expect("queue lock poisoned");
        let content = serde_json::to_string_pretty(&*stack).context("Failed to serialize queue")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write queue file: {}", path.display()))?;

        Ok(())
    }
}

fn queue_path(project_dir: &Path) -> PathBuf {
    project_dir.join(QUEUE_FILE)
}
