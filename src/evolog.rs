//! The evolution log: one CSV row per cycle, written even on crash paths.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

const EVOLOG_FILE: &str = ".evo/evolution.csv";
const HEADER: &str = "cycle,objective,status,elapsed_seconds,quality_placeholder,strategy,start_ts,end_ts,reason_code,context";

/// One row of the evolution log.
#[derive(Debug, Clone)]
pub struct EvolutionRecord {
    pub cycle: u64,
    pub objective: String,
    pub status: String,
    pub elapsed_seconds: f64,
    pub strategy: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub reason_code: String,
    pub context: String,
}

/// Appends rows to the CSV evolution log, creating it with a header on
/// first use.
#[derive(Debug, Clone)]
pub struct EvolutionLog {
    path: PathBuf,
}

impl EvolutionLog {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            path: project_dir.join(EVOLOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record.
    pub fn append(&self, record: &EvolutionRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let is_new = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open evolution log: {}", self.path.display()))?;

        if is_new {
            writeln!(file, "{HEADER}").context("Failed to write evolution log header")?;
        }

        let row = [
            record.cycle.to_string(),
            csv_escape(&record.objective),
            csv_escape(&record.status),
            format!("{:.3}", record.elapsed_seconds),
            // quality_placeholder: reserved column, never populated
            String::new(),
            csv_escape(&record.strategy),
            record.start_ts.to_rfc3339(),
            record.end_ts.to_rfc3339(),
            csv_escape(&record.reason_code),
            csv_escape(&record.context),
        ];
        writeln!(file, "{}", row.join(",")).context("Failed to append evolution log row")?;

        Ok(())
    }
}

/// Quotes a field when it contains a delimiter, quote, or newline.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
