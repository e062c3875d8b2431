//! Command-backed validation steps (syntax checks, test runs).

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{StepReport, ValidationStep};
use crate::plan::ValidationOutcome;

/// Runs a configured shell command from the base path; exit code 0 passes.
///
/// Spawn failures and timeouts are reported as ordinary step failures with
/// the step's reason code, never as engine crashes.
pub struct CommandStep {
    name: &'static str,
    command: String,
    failure_reason: &'static str,
    base_path: PathBuf,
    timeout: Duration,
}

impl CommandStep {
    pub fn new(
        name: &'static str,
        command: String,
        failure_reason: &'static str,
        base_path: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            name,
            command,
            failure_reason,
            base_path,
            timeout,
        }
    }

    async fn run_command(&self) -> Result<ValidationOutcome, String> {
        let parts = shell_words::split(&self.command)
            .map_err(|e| format!("Failed to parse command '{}': {e}", self.command))?;
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| "Validation command cannot be empty".to_string())?;

        debug!("Running '{}' in {}", self.command, self.base_path.display());
        let future = tokio::process::Command::new(program)
            .current_dir(&self.base_path)
            .args(args)
            .output();

        let output = tokio::time::timeout(self.timeout, future)
            .await
            .map_err(|_| {
                format!(
                    "'{}' timed out after {} seconds",
                    self.command,
                    self.timeout.as_secs()
                )
            })?
            .map_err(|e| format!("Failed to run '{}': {e}", self.command))?;

        if output.status.success() {
            info!("Step '{}' passed: {}", self.name, self.command);
            return Ok(ValidationOutcome::ok(
                "COMMAND_PASSED",
                format!("'{}' exited 0", self.command),
            ));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let details = if stderr.trim().is_empty() {
            stdout.to_string()
        } else {
            stderr.to_string()
        };
        Err(format!(
            "'{}' failed with exit code {:?}:\n{}",
            self.command,
            output.status.code(),
            details.trim()
        ))
    }
}

#[async_trait]
impl ValidationStep for CommandStep {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&self) -> StepReport {
        let outcome = match self.run_command().await {
            Ok(outcome) => outcome,
            Err(details) => ValidationOutcome::fail(self.failure_reason, details),
        };
        StepReport::from_outcome(outcome)
    }
}
