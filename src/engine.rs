//! The objective execution cycle.
//!
//! One cycle takes the newest queued objective through planning, strategy
//! selection, sandboxed validation, promotion, a post-promotion sanity
//! check, and an optional commit. Every cycle ends in a terminal outcome
//! that is written to the ledger and the evolution log before the next
//! objective is considered, including when the cycle itself errors out.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::evolog::{EvolutionLog, EvolutionRecord};
use crate::ledger::{FailureLedger, OutcomeStatus};
use crate::manifest;
use crate::plan::{reason, PatchInstruction, ValidationOutcome};
use crate::planner::{
    CommandPlanner, CommandSelector, DefaultSelector, Planner, SelectorDecision, StrategySelector,
};
use crate::promote::PromotionManager;
use crate::queue::{Objective, ObjectiveQueue, CORRECTION_MARKER};
use crate::sandbox::SandboxManager;
use crate::state::EngineState;
use crate::steps::{run_pipeline, ResolvedStrategy, StepContext};
use crate::vcs::VcsGateway;

/// Marker line prefixed to synthesized capability-acquisition objectives.
pub const CAPACITATION_MARKER: &str = "[capacitation]";

/// Everything the engine operates on, passed in explicitly so tests can
/// swap in scripted planners and selectors.
pub struct EngineContext {
    pub project_root: PathBuf,
    pub config: Config,
    pub planner: Box<dyn Planner>,
    pub selector: Box<dyn StrategySelector>,
    pub queue: ObjectiveQueue,
    pub ledger: FailureLedger,
    pub evolog: EvolutionLog,
    pub vcs: VcsGateway,
    pub sandboxes: SandboxManager,
}

impl EngineContext {
    /// Builds the production context: command-backed planner and selector
    /// from `evo.toml`, persisted queue and ledger from `.evo/`.
    pub fn initialize(project_root: &Path, config: Config) -> Result<Self> {
        anyhow::ensure!(
            !config.planner.plan_command.trim().is_empty(),
            "No planner configured. Set [planner].plan_command in evo.toml"
        );

        let timeout = config.engine.command_timeout();
        let planner: Box<dyn Planner> = Box::new(CommandPlanner::new(
            config.planner.plan_command.clone(),
            Some(config.planner.next_objective_command.clone()),
            project_root.to_path_buf(),
            timeout,
        ));
        let selector: Box<dyn StrategySelector> =
            if config.planner.select_command.trim().is_empty() {
                Box::new(DefaultSelector)
            } else {
                Box::new(CommandSelector::new(
                    config.planner.select_command.clone(),
                    project_root.to_path_buf(),
                    timeout,
                ))
            };

        Self::with_parts(project_root, config, planner, selector)
    }

    /// Builds a context around explicit planner and selector implementations.
    pub fn with_parts(
        project_root: &Path,
        config: Config,
        planner: Box<dyn Planner>,
        selector: Box<dyn StrategySelector>,
    ) -> Result<Self> {
        let queue = ObjectiveQueue::load(project_root)?;
        let ledger = FailureLedger::load(project_root, config.engine.ledger_capacity)?;
        let evolog = EvolutionLog::new(project_root);
        let vcs = VcsGateway::new(project_root, config.engine.command_timeout());
        let sandboxes = SandboxManager::new(project_root);

        Ok(Self {
            project_root: project_root.to_path_buf(),
            config,
            planner,
            selector,
            queue,
            ledger,
            evolog,
            vcs,
            sandboxes,
        })
    }
}

/// What a finished run reports back to the caller.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub cycles_run: u64,
    pub last_reason_code: Option<String>,
}

/// Terminal result of one cycle, before re-queue decisions are applied.
struct CycleResult {
    outcome: ValidationOutcome,
    strategy_key: String,
    patches: Vec<PatchInstruction>,
    /// True when the cycle already pushed its own follow-up objectives
    /// (capacitation) and the correction logic must not run.
    requeue_handled: bool,
}

impl CycleResult {
    fn terminal(outcome: ValidationOutcome) -> Self {
        Self {
            outcome,
            strategy_key: "-".to_string(),
            patches: Vec::new(),
            requeue_handled: false,
        }
    }
}

/// Drives objectives from the queue to terminal outcomes, one at a time.
pub struct CycleEngine {
    ctx: EngineContext,
    state: EngineState,
}

impl CycleEngine {
    pub fn new(ctx: EngineContext) -> Result<Self> {
        let state = EngineState::load_or_create(&ctx.project_root)?;
        Ok(Self { ctx, state })
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Runs cycles until the queue drains, the cycle limit is reached, or
    /// a cancel flips the persisted active flag.
    pub async fn run(&mut self, max_cycles: Option<u64>) -> Result<RunSummary> {
        let root = self.ctx.project_root.clone();
        self.state.active = true;
        self.state.started_at = Utc::now();
        self.state.save(&root)?;
        info!(event = "run_start", queued = self.ctx.queue.len(), "Engine run starting");

        let mut cycles_run = 0u64;
        loop {
            if !self.state.active {
                info!(event = "run_cancelled", "Stop requested; ending run");
                break;
            }
            if let Some(max) = max_cycles {
                if cycles_run >= max {
                    info!(event = "run_limit", max, "Cycle limit reached");
                    break;
                }
            }
            let Some(objective) = self.ctx.queue.pop() else {
                info!(event = "queue_drained", "No objectives left");
                break;
            };

            self.run_cycle(objective).await?;
            cycles_run += 1;
        }

        self.state.active = false;
        self.state.save(&root)?;
        Ok(RunSummary {
            cycles_run,
            last_reason_code: self.state.last_reason_code.clone(),
        })
    }

    /// Takes one objective to a terminal outcome and records it.
    async fn run_cycle(&mut self, objective: Objective) -> Result<()> {
        let root = self.ctx.project_root.clone();
        let start_ts = Utc::now();
        let started = Instant::now();
        self.state.cycle += 1;
        let cycle = self.state.cycle;

        info!(
            event = "cycle_start",
            cycle,
            objective = %one_line(&objective.text, 120),
            "Starting objective cycle"
        );

        let result = match self.attempt(&objective).await {
            Ok(result) => result,
            Err(err) => {
                warn!(event = "cycle_crashed", cycle, error = %format!("{err:#}"), "Cycle hit an unexpected error");
                CycleResult {
                    outcome: ValidationOutcome::fail(reason::UNEXPECTED_ERROR, format!("{err:#}")),
                    strategy_key: "-".to_string(),
                    patches: Vec::new(),
                    requeue_handled: true,
                }
            }
        };

        let status = if result.outcome.success {
            OutcomeStatus::Success
        } else {
            OutcomeStatus::Failure
        };
        info!(
            event = "cycle_end",
            cycle,
            success = result.outcome.success,
            reason = %result.outcome.reason_code,
            strategy = %result.strategy_key,
            "Cycle finished"
        );

        // Outcome recording happens before any re-queueing so a crash
        // between the two never loses the history the degenerate-loop
        // ceiling depends on.
        self.ctx
            .ledger
            .record(&objective.text, status, &result.outcome.reason_code);
        if let Err(err) = self.ctx.ledger.save(&root) {
            warn!("Failed to persist ledger: {err:#}");
        }
        let end_ts = Utc::now();
        let record = EvolutionRecord {
            cycle,
            objective: objective.text.clone(),
            status: match status {
                OutcomeStatus::Success => "success".to_string(),
                OutcomeStatus::Failure => "failure".to_string(),
            },
            elapsed_seconds: started.elapsed().as_secs_f64(),
            strategy: result.strategy_key.clone(),
            start_ts,
            end_ts,
            reason_code: result.outcome.reason_code.clone(),
            context: one_line(&result.outcome.details, 300),
        };
        if let Err(err) = self.ctx.evolog.append(&record) {
            warn!("Failed to append evolution log: {err:#}");
        }

        if !result.outcome.success
            && !result.requeue_handled
            && reason::is_correctable(&result.outcome.reason_code)
        {
            // Original goes back first so the correction pops ahead of it.
            self.ctx.queue.push(objective.clone());
            let correction = synthesize_correction(&objective, &result);
            info!(
                event = "correction_queued",
                cycle,
                reason = %result.outcome.reason_code,
                "Queued a correction objective"
            );
            self.ctx.queue.push(correction);
        }

        if result.outcome.success && self.ctx.config.engine.self_generate {
            self.push_follow_up().await;
        }

        if let Err(err) = self.ctx.queue.save(&root) {
            warn!("Failed to persist queue: {err:#}");
        }

        self.state.last_cycle_at = Some(end_ts);
        self.state.last_reason_code = Some(result.outcome.reason_code.clone());
        // A cancel issued while the cycle ran must survive this save.
        if let Ok(Some(persisted)) = EngineState::load(&root) {
            self.state.active = self.state.active && persisted.active;
        }
        self.state.save(&root)?;

        Ok(())
    }

    /// The cycle proper. `Err` here means something outside the modeled
    /// failure set broke; the caller records it as `UNEXPECTED_ERROR`.
    async fn attempt(&mut self, objective: &Objective) -> Result<CycleResult> {
        let root = self.ctx.project_root.clone();

        let threshold = self.ctx.config.engine.failure_threshold;
        if self.ctx.ledger.is_degenerate(&objective.text, threshold) {
            let failures = self.ctx.ledger.consecutive_failures(&objective.text);
            warn!(
                event = "degenerate_objective",
                failures, "Objective discarded after repeated failures"
            );
            return Ok(CycleResult::terminal(ValidationOutcome::fail(
                reason::DEGENERATIVE_LOOP_DETECTED,
                format!("{failures} consecutive failures; objective discarded permanently"),
            )));
        }

        let manifest = manifest::render(&root, &self.ctx.vcs).await;

        let plan = match self.ctx.planner.plan(&objective.text, &manifest).await {
            Ok(plan) => plan,
            Err(err) => {
                return Ok(CycleResult::terminal(ValidationOutcome::fail(
                    reason::PLANNING_FAILED,
                    format!("{err:#}"),
                )))
            }
        };
        debug!(
            patches = plan.patches_to_apply.len(),
            analysis = %one_line(&plan.analysis, 200),
            "Plan received"
        );

        let failure_context = objective.is_correction().then_some(objective.text.as_str());
        let decision = match self.ctx.selector.select(&plan, failure_context).await {
            Ok(decision) => decision,
            Err(err) => {
                return Ok(CycleResult {
                    outcome: ValidationOutcome::fail(
                        reason::STRATEGY_SELECTION_FAILED,
                        format!("{err:#}"),
                    ),
                    strategy_key: "-".to_string(),
                    patches: plan.patches_to_apply,
                    requeue_handled: false,
                })
            }
        };

        let strategy_key = match decision {
            SelectorDecision::Strategy(key) => key,
            SelectorDecision::CapacitationRequired { capability } => {
                // The original waits underneath the capacitation objective.
                self.ctx.queue.push(objective.clone());
                self.ctx.queue.push(Objective::new(format!(
                    "{CAPACITATION_MARKER} Acquire missing capability: {capability}"
                )));
                info!(event = "capacitation_queued", capability = %capability, "Capability gap reported");
                return Ok(CycleResult {
                    outcome: ValidationOutcome::fail(
                        reason::CAPACITATION_REQUIRED,
                        format!("missing capability: {capability}"),
                    ),
                    strategy_key: "-".to_string(),
                    patches: plan.patches_to_apply,
                    requeue_handled: true,
                });
            }
        };

        let Some(strategy) = self.ctx.config.strategy(&strategy_key).cloned() else {
            return Ok(CycleResult {
                outcome: ValidationOutcome::fail(
                    reason::UNKNOWN_STRATEGY,
                    format!("no strategy registered under key '{strategy_key}'"),
                ),
                strategy_key,
                patches: plan.patches_to_apply,
                requeue_handled: false,
            });
        };
        let resolved = match ResolvedStrategy::resolve(&strategy) {
            Ok(resolved) => resolved,
            Err(err) => {
                return Ok(CycleResult {
                    outcome: ValidationOutcome::fail(
                        reason::UNKNOWN_VALIDATION_STEP,
                        err.to_string(),
                    ),
                    strategy_key,
                    patches: plan.patches_to_apply,
                    requeue_handled: false,
                })
            }
        };

        let timeout = self.ctx.config.engine.command_timeout();
        let commands = self.ctx.config.commands.clone();

        // Mutating strategies run against a sandbox copy; read-only ones
        // run directly on the real tree.
        if !resolved.mutates_disk() {
            let step_ctx = StepContext {
                base_path: root.clone(),
                patches: plan.patches_to_apply.clone(),
                running_in_sandbox: false,
                commands,
                command_timeout: timeout,
            };
            let run = run_pipeline(&resolved, &step_ctx).await;
            return Ok(CycleResult {
                outcome: run.outcome,
                strategy_key,
                patches: plan.patches_to_apply,
                requeue_handled: false,
            });
        }

        let sandbox = self
            .ctx
            .sandboxes
            .acquire()
            .context("Failed to create sandbox copy of the project")?;
        let step_ctx = StepContext {
            base_path: sandbox.path().to_path_buf(),
            patches: plan.patches_to_apply.clone(),
            running_in_sandbox: true,
            commands: commands.clone(),
            command_timeout: timeout,
        };
        let run = run_pipeline(&resolved, &step_ctx).await;

        if !run.outcome.success {
            // The sandbox and its changes are discarded with the handle.
            return Ok(CycleResult {
                outcome: run.outcome,
                strategy_key,
                patches: plan.patches_to_apply,
                requeue_handled: false,
            });
        }

        let touched = plan.touched_files();
        let promotion = PromotionManager::new(sandbox.path(), &root).promote(&touched);
        if let Err(err) = sandbox.release() {
            warn!("Failed to remove sandbox: {err}");
        }
        if let Err(err) = promotion {
            return Ok(CycleResult {
                outcome: ValidationOutcome::fail(reason::PROMOTION_FAILED, format!("{err:#}")),
                strategy_key,
                patches: plan.patches_to_apply,
                requeue_handled: false,
            });
        }
        info!(event = "promoted", files = touched.len(), "Validated changes promoted");

        // Sanity check re-runs one step against the real tree. A failure
        // here means the sandbox and the real tree disagree, so the tree
        // is rolled back to the last commit.
        if let Some(kind) = resolved.sanity_check {
            let sanity_ctx = StepContext {
                base_path: root.clone(),
                patches: Vec::new(),
                running_in_sandbox: false,
                commands,
                command_timeout: timeout,
            };
            let report = kind.build(&sanity_ctx).execute().await;
            if !report.outcome.success {
                warn!(
                    event = "regression_detected",
                    step = kind.name(),
                    "Sanity check failed on the real tree; rolling back"
                );
                let rollback_note = match self.ctx.vcs.hard_reset_and_checkout().await {
                    Ok(out) if out.success => "working tree rolled back".to_string(),
                    Ok(out) => format!("rollback incomplete: {}", one_line(&out.output, 200)),
                    Err(err) => format!("rollback failed: {err:#}"),
                };
                let code = format!("{}{}", reason::REGRESSION_PREFIX, kind.name());
                return Ok(CycleResult {
                    outcome: ValidationOutcome::fail(
                        &code,
                        format!("{}; {rollback_note}", one_line(&report.outcome.details, 300)),
                    ),
                    strategy_key,
                    patches: plan.patches_to_apply,
                    requeue_handled: false,
                });
            }
        }

        if self.ctx.config.git.auto_commit && self.ctx.vcs.is_repo().await {
            if let Err(details) = self.commit_cycle(&objective.text).await {
                // The promoted changes stay on disk; only the commit is
                // missing, so no rollback happens here.
                return Ok(CycleResult {
                    outcome: ValidationOutcome::fail(reason::COMMIT_FAILED_POST_SANITY, details),
                    strategy_key,
                    patches: plan.patches_to_apply,
                    requeue_handled: false,
                });
            }
        }

        Ok(CycleResult {
            outcome: run.outcome,
            strategy_key,
            patches: plan.patches_to_apply,
            requeue_handled: false,
        })
    }

    async fn commit_cycle(&self, objective_text: &str) -> Result<(), String> {
        let message = format!(
            "{} {}",
            self.ctx.config.git.commit_prefix,
            summarize(objective_text)
        );

        let add = self
            .ctx
            .vcs
            .add_all()
            .await
            .map_err(|err| format!("{err:#}"))?;
        if !add.success {
            return Err(format!("git add failed: {}", add.output.trim()));
        }

        let commit = self
            .ctx
            .vcs
            .commit(&message)
            .await
            .map_err(|err| format!("{err:#}"))?;
        if commit.success || commit.output.contains("nothing to commit") {
            Ok(())
        } else {
            Err(format!("git commit failed: {}", commit.output.trim()))
        }
    }

    async fn push_follow_up(&mut self) {
        let manifest = manifest::render(&self.ctx.project_root, &self.ctx.vcs).await;
        match self.ctx.planner.propose_next(&manifest).await {
            Ok(Some(text)) => {
                info!(event = "follow_up_queued", objective = %one_line(&text, 120), "Planner proposed a follow-up");
                self.ctx.queue.push(Objective::new(text));
            }
            Ok(None) => debug!("Planner proposed no follow-up objective"),
            Err(err) => warn!("Failed to obtain a follow-up objective: {err:#}"),
        }
    }
}

/// Builds the repair objective queued on top of a failed, correctable one.
fn synthesize_correction(objective: &Objective, result: &CycleResult) -> Objective {
    let patches =
        serde_json::to_string(&result.patches).unwrap_or_else(|_| "[]".to_string());
    Objective::new(format!(
        "{CORRECTION_MARKER} The previous attempt failed; diagnose the failure and fix it.\n\
         Original objective: {}\n\
         Failure reason: {}\n\
         Failure details: {}\n\
         Attempted patches: {}",
        objective.text,
        result.outcome.reason_code,
        one_line(&result.outcome.details, 500),
        one_line(&patches, 1000),
    ))
}

/// Collapses whitespace and truncates on a char boundary.
fn one_line(text: &str, limit: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() <= limit {
        return collapsed;
    }
    let mut end = limit;
    while !collapsed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &collapsed[..end])
}

/// First line of the objective, shortened for a commit subject.
fn summarize(text: &str) -> String {
    let first = text.lines().next().unwrap_or(text);
    if first.len() <= 72 {
        return first.trim_end().to_string();
    }
    let mut end = 72;
    while !first.is_char_boundary(end) {
        end -= 1;
    }
    first[..end].trim_end().to_string()
}
