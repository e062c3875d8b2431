//! Version control gateway: blocking `git` subprocess calls with captured
//! output and explicit timeouts.
//!
//! Success for every operation is process exit code 0; stdout and stderr
//! are captured verbatim for diagnostics.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// Captured result of one git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub success: bool,
    /// stdout followed by stderr, verbatim.
    pub output: String,
}

/// Wraps the project's `git` working tree operations.
#[derive(Debug, Clone)]
pub struct VcsGateway {
    root: PathBuf,
    timeout: Duration,
}

impl VcsGateway {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    /// Runs one git command under the configured timeout.
    async fn run(&self, args: &[&str]) -> Result<GitOutput> {
        debug!("git {}", args.join(" "));
        let future = tokio::process::Command::new("git")
            .current_dir(&self.root)
            .args(args)
            .output();

        let output = tokio::time::timeout(self.timeout, future)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "git {} timed out after {} seconds",
                    args.join(" "),
                    self.timeout.as_secs()
                )
            })?
            .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        Ok(GitOutput {
            success: output.status.success(),
            output: combined,
        })
    }

    /// True when the project root is inside a git work tree.
    pub async fn is_repo(&self) -> bool {
        self.run(&["rev-parse", "--git-dir"])
            .await
            .map(|o| o.success)
            .unwrap_or(false)
    }

    /// Stages everything (`git add .`).
    pub async fn add_all(&self) -> Result<GitOutput> {
        self.run(&["add", "."]).await
    }

    /// Commits staged changes with the given message.
    pub async fn commit(&self, message: &str) -> Result<GitOutput> {
        let result = self.run(&["commit", "-m", message]).await?;
        if result.success {
            info!("Committed: {}", message.lines().next().unwrap_or(message));
        } else {
            warn!("Commit failed: {}", result.output.trim());
        }
        Ok(result)
    }

    /// Restores a clean, previously-committed working tree:
    /// `git checkout -- .` then `git reset --hard`.
    pub async fn hard_reset_and_checkout(&self) -> Result<GitOutput> {
        let checkout = self.run(&["checkout", "--", "."]).await?;
        if !checkout.success {
            warn!("git checkout -- . failed: {}", checkout.output.trim());
        }
        let reset = self.run(&["reset", "--hard"]).await?;
        if reset.success {
            info!("Working tree rolled back to last commit");
        }
        Ok(GitOutput {
            success: checkout.success && reset.success,
            output: format!("{}\n{}", checkout.output.trim(), reset.output.trim()),
        })
    }

    /// Current HEAD commit hash, if any commits exist.
    pub async fn head_hash(&self) -> Option<String> {
        let result = self.run(&["rev-parse", "HEAD"]).await.ok()?;
        if !result.success {
            return None;
        }
        let hash = result.output.trim().to_string();
        if hash.is_empty() {
            None
        } else {
            Some(hash)
        }
    }

    /// Subjects of the most recent commits, newest first.
    pub async fn recent_subjects(&self, count: usize) -> Vec<String> {
        let count_arg = count.to_string();
        let Ok(result) = self.run(&["log", "-n", &count_arg, "--pretty=%s"]).await else {
            return Vec::new();
        };
        if !result.success {
            return Vec::new();
        }
        result
            .output
            .lines()
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }

    /// Porcelain status output, empty for a clean tree.
    pub async fn status_porcelain(&self) -> Result<String> {
        let result = self.run(&["status", "--porcelain"]).await?;
        Ok(result.output)
    }

    /// One-line log of the most recent commits.
    pub async fn log_oneline(&self, count: u32) -> Result<GitOutput> {
        let count_arg = count.to_string();
        self.run(&["log", "--oneline", "-n", &count_arg]).await
    }

    /// Discards the last `count` commits entirely.
    pub async fn reset_to_before(&self, count: u32) -> Result<GitOutput> {
        let target = format!("HEAD~{count}");
        self.run(&["reset", "--hard", &target]).await
    }
}
