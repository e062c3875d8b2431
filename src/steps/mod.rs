//! Named validation steps and the fail-fast pipeline that runs them.
//!
//! Step names are resolved to [`StepKind`]s when the strategy is resolved,
//! before anything executes, so an unknown name surfaces as
//! `UNKNOWN_VALIDATION_STEP` up front instead of deep inside a run.

mod apply;
mod command;

pub use apply::ApplyPatchesStep;
pub use command::CommandStep;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::CommandsConfig;
use crate::plan::{reason, PatchInstruction, ValidationOutcome, ValidationStrategy};

/// Everything a step needs to run: the tree it operates on, the plan's
/// patches, and whether that tree is a sandbox copy.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub base_path: PathBuf,
    pub patches: Vec<PatchInstruction>,
    pub running_in_sandbox: bool,
    pub commands: CommandsConfig,
    pub command_timeout: Duration,
}

/// Result of one step plus any per-file apply statuses it produced.
#[derive(Debug)]
pub struct StepReport {
    pub outcome: ValidationOutcome,
    pub apply_statuses: Option<BTreeMap<String, String>>,
}

impl StepReport {
    pub fn from_outcome(outcome: ValidationOutcome) -> Self {
        Self {
            outcome,
            apply_statuses: None,
        }
    }
}

/// A named check or mutation executed as part of a validation strategy.
#[async_trait]
pub trait ValidationStep: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self) -> StepReport;
}

/// Static registry of known step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    ApplyPatchesToDisk,
    CheckSyntax,
    RunTests,
}

impl StepKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::ApplyPatchesToDisk => "apply_patches_to_disk",
            Self::CheckSyntax => "check_syntax",
            Self::RunTests => "run_tests",
        }
    }

    /// True when executing this step writes to the tree it runs against.
    pub fn mutates_disk(self) -> bool {
        matches!(self, Self::ApplyPatchesToDisk)
    }

    /// Constructs the step for the given context.
    pub fn build(self, ctx: &StepContext) -> Box<dyn ValidationStep> {
        match self {
            Self::ApplyPatchesToDisk => Box::new(ApplyPatchesStep::new(
                ctx.base_path.clone(),
                ctx.patches.clone(),
            )),
            Self::CheckSyntax => Box::new(CommandStep::new(
                self.name(),
                ctx.commands.syntax_check.clone(),
                reason::SYNTAX_CHECK_FAILED,
                ctx.base_path.clone(),
                ctx.command_timeout,
            )),
            Self::RunTests => Box::new(CommandStep::new(
                self.name(),
                ctx.commands.tests.clone(),
                reason::TESTS_FAILED,
                ctx.base_path.clone(),
                ctx.command_timeout,
            )),
        }
    }
}

impl FromStr for StepKind {
    type Err = UnknownStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply_patches_to_disk" => Ok(Self::ApplyPatchesToDisk),
            // Legacy aliases kept for configs written against the
            // Python-focused defaults.
            "check_syntax" | "check_python_syntax" => Ok(Self::CheckSyntax),
            "run_tests" | "run_pytest_validation" => Ok(Self::RunTests),
            _ => Err(UnknownStep {
                name: s.to_string(),
            }),
        }
    }
}

/// A step name with no registered constructor.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown validation step '{name}'")]
pub struct UnknownStep {
    pub name: String,
}

/// A strategy with every step name resolved ahead of execution.
#[derive(Debug, Clone)]
pub struct ResolvedStrategy {
    pub steps: Vec<StepKind>,
    pub sanity_check: Option<StepKind>,
}

impl ResolvedStrategy {
    /// Resolves all step names, failing on the first unknown one.
    pub fn resolve(strategy: &ValidationStrategy) -> Result<Self, UnknownStep> {
        let steps = strategy
            .steps
            .iter()
            .map(|name| name.parse())
            .collect::<Result<Vec<_>, _>>()?;
        let sanity_check = strategy
            .sanity_check_step
            .as_deref()
            .map(str::parse)
            .transpose()?;
        Ok(Self {
            steps,
            sanity_check,
        })
    }

    /// True when any step in the list writes to disk.
    pub fn mutates_disk(&self) -> bool {
        self.steps.iter().any(|s| s.mutates_disk())
    }
}

/// Aggregate result of one pipeline run.
#[derive(Debug)]
pub struct PipelineRun {
    pub outcome: ValidationOutcome,
    /// Per-file statuses from the apply step, when one ran.
    pub apply_statuses: BTreeMap<String, String>,
}

/// Executes the resolved step list strictly in order, stopping at the first
/// failing step.
pub async fn run_pipeline(strategy: &ResolvedStrategy, ctx: &StepContext) -> PipelineRun {
    let mut apply_statuses = BTreeMap::new();

    for kind in &strategy.steps {
        let step = kind.build(ctx);
        debug!(
            "Running step '{}' against {} (sandbox: {})",
            step.name(),
            ctx.base_path.display(),
            ctx.running_in_sandbox
        );

        let report = step.execute().await;
        if let Some(statuses) = report.apply_statuses {
            apply_statuses.extend(statuses);
        }

        if !report.outcome.success {
            info!(
                "Step '{}' failed: {}",
                step.name(),
                report.outcome.reason_code
            );
            return PipelineRun {
                outcome: report.outcome,
                apply_statuses,
            };
        }
    }

    let outcome = if strategy.mutates_disk() {
        ValidationOutcome::ok(reason::STRATEGY_SUCCEEDED, "all steps passed")
    } else {
        ValidationOutcome::ok(reason::VALIDATION_SUCCESS_NO_CHANGES, "all steps passed")
    };
    PipelineRun {
        outcome,
        apply_statuses,
    }
}
