//! External planner and strategy-selector seams.
//!
//! Plan generation is an external capability: the engine only defines the
//! interface. The command-backed implementations spawn a configured
//! executable and exchange JSON over stdin/stdout; mocks script responses
//! for E2E engine tests.

pub mod command;
#[cfg(test)]
pub mod mock;

pub use command::{CommandPlanner, CommandSelector};

use anyhow::Result;
use async_trait::async_trait;

use crate::plan::ActionPlan;

/// Turns an objective plus the current project manifest into an action plan.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Name for display and logging.
    fn name(&self) -> &'static str;

    /// Produce a plan for the objective. An error here is a fatal,
    /// non-retryable cycle failure.
    async fn plan(&self, objective: &str, manifest: &str) -> Result<ActionPlan>;

    /// Propose the next evolutionary objective after a successful cycle.
    /// `None` means the planner has nothing to suggest.
    async fn propose_next(&self, manifest: &str) -> Result<Option<String>>;
}

/// The selector's verdict for a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorDecision {
    /// Run the strategy registered under this key.
    Strategy(String),
    /// The system lacks a capability the plan needs; the engine queues a
    /// capacitation objective ahead of the original one.
    CapacitationRequired { capability: String },
}

/// Maps an action plan to a validation strategy key.
#[async_trait]
pub trait StrategySelector: Send + Sync {
    /// Name for display and logging.
    fn name(&self) -> &'static str;

    /// Select a strategy for the plan. `failure_context` carries the reason
    /// of the previous failed attempt when this is a correction cycle.
    async fn select(
        &self,
        plan: &ActionPlan,
        failure_context: Option<&str>,
    ) -> Result<SelectorDecision>;
}

/// Rule-based fallback used when no selector command is configured:
/// plans with patches get the full pipeline, read-only plans get the
/// check-only strategy.
#[derive(Debug, Default, Clone)]
pub struct DefaultSelector;

#[async_trait]
impl StrategySelector for DefaultSelector {
    fn name(&self) -> &'static str {
        "default-rules"
    }

    async fn select(
        &self,
        plan: &ActionPlan,
        _failure_context: Option<&str>,
    ) -> Result<SelectorDecision> {
        let key = if plan.patches_to_apply.is_empty() {
            "read_only_check"
        } else {
            "full_validation"
        };
        Ok(SelectorDecision::Strategy(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PatchInstruction, PatchOperation};

    #[tokio::test]
    async fn test_default_selector_prefers_full_validation_for_patches() {
        let selector = DefaultSelector;
        let plan = ActionPlan {
            analysis: String::new(),
            patches_to_apply: vec![PatchInstruction {
                operation: PatchOperation::Insert,
                file_path: "a.py".to_string(),
                match_text: None,
                content: Some("x".to_string()),
                line_number: None,
            }],
        };

        let decision = selector.select(&plan, None).await.unwrap();
        assert_eq!(
            decision,
            SelectorDecision::Strategy("full_validation".to_string())
        );
    }

    #[tokio::test]
    async fn test_default_selector_read_only_for_empty_plan() {
        let selector = DefaultSelector;
        let decision = selector.select(&ActionPlan::default(), None).await.unwrap();
        assert_eq!(
            decision,
            SelectorDecision::Strategy("read_only_check".to_string())
        );
    }
}
