//! Append-only record of cycle outcomes per objective.
//!
//! The ledger exists to answer one question: has this exact objective text
//! failed too many consecutive times? Entries are never mutated after
//! append; history is bounded so the file cannot grow without limit.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const LEDGER_FILE: &str = ".evo/ledger.json";

/// Outcome of one cycle attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// One appended outcome record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub objective: String,
    pub status: OutcomeStatus,
    pub reason_code: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, append-only outcome history.
#[derive(Debug)]
pub struct FailureLedger {
    entries: VecDeque<LedgerEntry>,
    capacity: usize,
}

impl FailureLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends an outcome, evicting the oldest entry past capacity.
    pub fn record(&mut self, objective: &str, status: OutcomeStatus, reason_code: &str) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LedgerEntry {
            objective: objective.to_string(),
            status,
            reason_code: reason_code.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Consecutive failures for this exact objective text, scanning newest
    /// first and stopping at the first success.
    pub fn consecutive_failures(&self, objective: &str) -> usize {
        let mut count = 0;
        for entry in self.entries.iter().rev() {
            if entry.objective != objective {
                continue;
            }
            match entry.status {
                OutcomeStatus::Failure => count += 1,
                OutcomeStatus::Success => break,
            }
        }
        count
    }

    /// True once the objective has hit the consecutive-failure ceiling and
    /// must be discarded rather than retried.
    pub fn is_degenerate(&self, objective: &str, threshold: usize) -> bool {
        threshold > 0 && self.consecutive_failures(objective) >= threshold
    }

    /// Most recent entries, newest last.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &LedgerEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load the persisted ledger, empty if the file does not exist.
    pub fn load(project_dir: &Path, capacity: usize) -> Result<Self> {
        let path = ledger_path(project_dir);
        if !path.exists() {
            return Ok(Self::new(capacity));
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read ledger file: {}", path.display()))?;
        let mut entries: VecDeque<LedgerEntry> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse ledger file: {}", path.display()))?;

        let capacity = capacity.max(1);
        while entries.len() > capacity {
            entries.pop_front();
        }

        Ok(Self { entries, capacity })
    }

    /// Persist the ledger to disk.
    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let path = ledger_path(project_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let content =
            serde_json::to_string_pretty(&self.entries).context("Failed to serialize ledger")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write ledger file: {}", path.display()))?;

        Ok(())
    }
}

fn ledger_path(project_dir: &Path) -> PathBuf {
    project_dir.join(LEDGER_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_consecutive_failures_stop_at_success() {
        let mut ledger = FailureLedger::new(100);
        ledger.record("obj", OutcomeStatus::Failure, "TESTS_FAILED");
        ledger.record("obj", OutcomeStatus::Success, "STRATEGY_SUCCEEDED");
        ledger.record("obj", OutcomeStatus::Failure, "TESTS_FAILED");
        ledger.record("obj", OutcomeStatus::Failure, "BLOCK_NOT_FOUND");

        assert_eq!(ledger.consecutive_failures("obj"), 2);
    }

    #[test]
    fn test_other_objectives_do_not_interfere() {
        let mut ledger = FailureLedger::new(100);
        ledger.record("a", OutcomeStatus::Failure, "TESTS_FAILED");
        ledger.record("b", OutcomeStatus::Success, "STRATEGY_SUCCEEDED");
        ledger.record("a", OutcomeStatus::Failure, "TESTS_FAILED");

        assert_eq!(ledger.consecutive_failures("a"), 2);
        assert_eq!(ledger.consecutive_failures("b"), 0);
    }

    #[test]
    fn test_degenerate_threshold() {
        let mut ledger = FailureLedger::new(100);
        for _ in 0..3 {
            ledger.record("obj", OutcomeStatus::Failure, "TESTS_FAILED");
        }

        assert!(ledger.is_degenerate("obj", 3));
        assert!(!ledger.is_degenerate("obj", 4));
        assert!(!ledger.is_degenerate("other", 3));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut ledger = FailureLedger::new(2);
        ledger.record("a", OutcomeStatus::Failure, "X");
        ledger.record("b", OutcomeStatus::Failure, "Y");
        ledger.record("c", OutcomeStatus::Failure, "Z");

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.consecutive_failures("a"), 0);
        assert_eq!(ledger.consecutive_failures("c"), 1);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempdir().unwrap();
        let mut ledger = FailureLedger::new(10);
        ledger.record("obj", OutcomeStatus::Failure, "TESTS_FAILED");
        ledger.save(dir.path()).unwrap();

        let loaded = FailureLedger::load(dir.path(), 10).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.consecutive_failures("obj"), 1);
    }

    #[test]
    fn test_load_truncates_to_capacity() {
        let dir = tempdir().unwrap();
        let mut ledger = FailureLedger::new(10);
        for i in 0..5 {
            ledger.record(&format!("obj-{i}"), OutcomeStatus::Failure, "X");
        }
        ledger.save(dir.path()).unwrap();

        let loaded = FailureLedger::load(dir.path(), 2).unwrap();
        assert_eq!(loaded.len(), 2);
    }
}
