//! Command-backed planner and selector.
//!
//! Each call spawns the configured executable, writes a JSON request to its
//! stdin, and parses a JSON response from its stdout:
//!
//! - plan:   `{"objective": ..., "manifest": ...}` →
//!   `{"analysis": ..., "patches_to_apply": [...]}`
//! - select: `{"plan": ..., "failure_context": ...}` →
//!   `{"strategy_key": "..."}` or `{"capacitation_required": "..."}`
//! - next:   `{"manifest": ...}` → `{"objective": "..."}` or `{}`

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{Planner, SelectorDecision, StrategySelector};
use crate::plan::ActionPlan;

/// Spawns a configured command and exchanges one JSON message with it.
#[derive(Debug, Clone)]
struct JsonCommand {
    command: String,
    working_dir: PathBuf,
    timeout: Duration,
}

impl JsonCommand {
    fn new(command: String, working_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            command,
            working_dir,
            timeout,
        }
    }

    async fn invoke(&self, request: &serde_json::Value) -> Result<String> {
        let parts = shell_words::split(&self.command)
            .with_context(|| format!("Failed to parse command: {}", self.command))?;
        let (program, args) = parts
            .split_first()
            .context("Configured command is empty")?;

        debug!("Invoking external command: {}", self.command);
        let mut child = tokio::process::Command::new(program)
            .current_dir(&self.working_dir)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(request).context("Failed to encode request")?;
            stdin.write_all(&payload).await?;
            stdin.flush().await?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "'{}' timed out after {} seconds",
                    self.command,
                    self.timeout.as_secs()
                )
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Command stderr: {}", stderr);
            anyhow::bail!(
                "'{}' failed with exit code {:?}: {}",
                self.command,
                output.status.code(),
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Planner backed by an external executable.
pub struct CommandPlanner {
    plan: JsonCommand,
    next: Option<JsonCommand>,
}

impl CommandPlanner {
    pub fn new(
        plan_command: String,
        next_objective_command: Option<String>,
        working_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        let next = next_objective_command
            .filter(|c| !c.trim().is_empty())
            .map(|c| JsonCommand::new(c, working_dir.clone(), timeout));
        Self {
            plan: JsonCommand::new(plan_command, working_dir, timeout),
            next,
        }
    }
}

#[async_trait]
impl Planner for CommandPlanner {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn plan(&self, objective: &str, manifest: &str) -> Result<ActionPlan> {
        let request = json!({ "objective": objective, "manifest": manifest });
        let response = self.plan.invoke(&request).await?;
        let plan: ActionPlan = serde_json::from_str(response.trim())
            .with_context(|| format!("Planner returned invalid JSON: {}", truncate(&response)))?;
        Ok(plan)
    }

    async fn propose_next(&self, manifest: &str) -> Result<Option<String>> {
        let Some(ref next) = self.next else {
            return Ok(None);
        };

        #[derive(Deserialize)]
        struct NextResponse {
            #[serde(default)]
            objective: Option<String>,
        }

        let response = next.invoke(&json!({ "manifest": manifest })).await?;
        let parsed: NextResponse = serde_json::from_str(response.trim()).with_context(|| {
            format!(
                "Next-objective command returned invalid JSON: {}",
                truncate(&response)
            )
        })?;
        Ok(parsed.objective.filter(|o| !o.trim().is_empty()))
    }
}

/// Strategy selector backed by an external executable.
pub struct CommandSelector {
    select: JsonCommand,
}

impl CommandSelector {
    pub fn new(select_command: String, working_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            select: JsonCommand::new(select_command, working_dir, timeout),
        }
    }
}

#[async_trait]
impl StrategySelector for CommandSelector {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn select(
        &self,
        plan: &ActionPlan,
        failure_context: Option<&str>,
    ) -> Result<SelectorDecision> {
        #[derive(Deserialize)]
        struct SelectResponse {
            #[serde(default)]
            strategy_key: Option<String>,
            #[serde(default)]
            capacitation_required: Option<String>,
        }

        let request = json!({ "plan": plan, "failure_context": failure_context });
        let response = self.select.invoke(&request).await?;
        let parsed: SelectResponse = serde_json::from_str(response.trim())
            .with_context(|| format!("Selector returned invalid JSON: {}", truncate(&response)))?;

        if let Some(capability) = parsed.capacitation_required {
            return Ok(SelectorDecision::CapacitationRequired { capability });
        }
        let key = parsed
            .strategy_key
            .filter(|k| !k.trim().is_empty())
            .context("Selector returned neither a strategy key nor a capability gap")?;
        Ok(SelectorDecision::Strategy(key))
    }
}

fn truncate(s: &str) -> String {
    const LIMIT: usize = 200;
    if s.len() <= LIMIT {
        return s.to_string();
    }
    let mut end = LIMIT;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn command(cmd: &str, dir: &std::path::Path) -> JsonCommand {
        JsonCommand::new(cmd.to_string(), dir.to_path_buf(), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_json_command_round_trip() {
        // `cat` echoes the request back, which is itself valid JSON.
        let dir = tempdir().unwrap();
        let response = command("cat", dir.path())
            .invoke(&json!({"objective": "x"}))
            .await
            .unwrap();
        assert!(response.contains("\"objective\""));
    }

    #[tokio::test]
    async fn test_json_command_nonzero_exit_is_error() {
        let dir = tempdir().unwrap();
        let result = command("false", dir.path()).invoke(&json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_json_command_empty_command_is_error() {
        let dir = tempdir().unwrap();
        let result = command("", dir.path()).invoke(&json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_command_planner_parses_plan() {
        let dir = tempdir().unwrap();
        let planner = CommandPlanner::new(
            r#"echo '{"analysis":"ok","patches_to_apply":[]}'"#.to_string(),
            None,
            dir.path().to_path_buf(),
            Duration::from_secs(10),
        );

        let plan = planner.plan("objective", "manifest").await.unwrap();
        assert_eq!(plan.analysis, "ok");
        assert!(plan.patches_to_apply.is_empty());
    }

    #[tokio::test]
    async fn test_command_planner_invalid_json_is_error() {
        let dir = tempdir().unwrap();
        let planner = CommandPlanner::new(
            "echo not-json".to_string(),
            None,
            dir.path().to_path_buf(),
            Duration::from_secs(10),
        );

        assert!(planner.plan("objective", "manifest").await.is_err());
    }

    #[tokio::test]
    async fn test_command_selector_strategy_key() {
        let dir = tempdir().unwrap();
        let selector = CommandSelector::new(
            r#"echo '{"strategy_key":"full_validation"}'"#.to_string(),
            dir.path().to_path_buf(),
            Duration::from_secs(10),
        );

        let decision = selector.select(&ActionPlan::default(), None).await.unwrap();
        assert_eq!(
            decision,
            SelectorDecision::Strategy("full_validation".to_string())
        );
    }

    #[tokio::test]
    async fn test_command_selector_capacitation() {
        let dir = tempdir().unwrap();
        let selector = CommandSelector::new(
            r#"echo '{"capacitation_required":"needs a database client"}'"#.to_string(),
            dir.path().to_path_buf(),
            Duration::from_secs(10),
        );

        let decision = selector.select(&ActionPlan::default(), None).await.unwrap();
        assert_eq!(
            decision,
            SelectorDecision::CapacitationRequired {
                capability: "needs a database client".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_propose_next_without_command_is_none() {
        let dir = tempdir().unwrap();
        let planner = CommandPlanner::new(
            "cat".to_string(),
            None,
            dir.path().to_path_buf(),
            Duration::from_secs(10),
        );
        assert!(planner.propose_next("manifest").await.unwrap().is_none());
    }
}
