//! Request a cooperative stop of a running engine.
//!
//! Core logic is pure: takes state, returns updated state. The engine
//! checks the persisted flag between cycles; a started cycle always runs
//! to its terminal outcome first.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fmt::Write;

use crate::state::EngineState;

pub async fn run() -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    let state = EngineState::load(&cwd)?;
    let (result, updated) = cancel_engine(state);
    if let (CancelResult::Cancelled { .. }, Some(state)) = (&result, updated) {
        state.save(&cwd)?;
    }

    print!("{}", format_result(&result));
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CancelResult {
    Cancelled { cycle: u64 },
    NotRunning,
}

fn cancel_engine(state: Option<EngineState>) -> (CancelResult, Option<EngineState>) {
    match state {
        Some(mut state) if state.active => {
            let cycle = state.cycle;
            state.active = false;
            (CancelResult::Cancelled { cycle }, Some(state))
        }
        Some(state) => (CancelResult::NotRunning, Some(state)),
        None => (CancelResult::NotRunning, None),
    }
}

fn format_result(result: &CancelResult) -> String {
    let mut out = String::new();
    match result {
        CancelResult::Cancelled { cycle } => {
            writeln!(
                &mut out,
                "\n{} Stop requested after cycle {}. The engine halts once the current cycle finishes.",
                "✓".green(),
                cycle.to_string().cyan()
            )
            .unwrap();
        }
        CancelResult::NotRunning => {
            writeln!(&mut out, "\n{} No running engine found.", "ℹ".blue()).unwrap();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_state(active: bool, cycle: u64) -> EngineState {
        EngineState {
            active,
            cycle,
            started_at: Utc::now(),
            last_cycle_at: None,
            last_reason_code: None,
        }
    }

    #[test]
    fn test_cancel_running_engine() {
        let (result, updated) = cancel_engine(Some(make_state(true, 7)));
        assert_eq!(result, CancelResult::Cancelled { cycle: 7 });
        assert!(!updated.unwrap().active);
    }

    #[test]
    fn test_cancel_idle_engine() {
        let (result, _) = cancel_engine(Some(make_state(false, 3)));
        assert_eq!(result, CancelResult::NotRunning);
    }

    #[test]
    fn test_cancel_without_state() {
        let (result, updated) = cancel_engine(None);
        assert_eq!(result, CancelResult::NotRunning);
        assert!(updated.is_none());
    }

    #[test]
    fn test_format_results() {
        assert!(format_result(&CancelResult::Cancelled { cycle: 7 }).contains("Stop requested"));
        assert!(format_result(&CancelResult::NotRunning).contains("No running engine"));
    }
}
