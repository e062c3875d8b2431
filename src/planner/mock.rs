//! Scripted planner and selector for E2E engine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{Planner, SelectorDecision, StrategySelector};
use crate::plan::ActionPlan;

/// A single scripted planner response.
#[derive(Debug, Clone)]
pub enum MockPlan {
    Plan(ActionPlan),
    Error(String),
}

/// Planner returning scripted responses in order, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct MockPlanner {
    responses: Arc<Vec<MockPlan>>,
    invocation_count: Arc<AtomicUsize>,
    next_objective: Option<String>,
}

impl MockPlanner {
    pub fn new(responses: Vec<MockPlan>) -> Self {
        Self {
            responses: Arc::new(responses),
            invocation_count: Arc::new(AtomicUsize::new(0)),
            next_objective: None,
        }
    }

    pub fn always(plan: ActionPlan) -> Self {
        Self::new(vec![MockPlan::Plan(plan)])
    }

    pub fn always_fail(message: &str) -> Self {
        Self::new(vec![MockPlan::Error(message.to_string())])
    }

    /// Configures the follow-up objective proposed after successes.
    pub fn with_next_objective(mut self, objective: &str) -> Self {
        self.next_objective = Some(objective.to_string());
        self
    }

    pub fn invocation_count(&self) -> usize {
        self.invocation_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Planner for MockPlanner {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn plan(&self, _objective: &str, _manifest: &str) -> Result<ActionPlan> {
        let count = self.invocation_count.fetch_add(1, Ordering::SeqCst);
        match &self.responses[count % self.responses.len()] {
            MockPlan::Plan(plan) => Ok(plan.clone()),
            MockPlan::Error(msg) => anyhow::bail!("{msg}"),
        }
    }

    async fn propose_next(&self, _manifest: &str) -> Result<Option<String>> {
        Ok(self.next_objective.clone())
    }
}

/// A single scripted selector response.
#[derive(Debug, Clone)]
pub enum MockSelect {
    Strategy(String),
    Capacitation(String),
    Error(String),
}

/// Selector returning scripted decisions in order, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct MockSelector {
    decisions: Arc<Vec<MockSelect>>,
    invocation_count: Arc<AtomicUsize>,
}

impl MockSelector {
    pub fn new(decisions: Vec<MockSelect>) -> Self {
        Self {
            decisions: Arc::new(decisions),
            invocation_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(strategy_key: &str) -> Self {
        Self::new(vec![MockSelect::Strategy(strategy_key.to_string())])
    }

    pub fn invocation_count(&self) -> usize {
        self.invocation_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StrategySelector for MockSelector {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn select(
        &self,
        _plan: &ActionPlan,
        _failure_context: Option<&str>,
    ) -> Result<SelectorDecision> {
        let count = self.invocation_count.fetch_add(1, Ordering::SeqCst);
        match &self.decisions[count % self.decisions.len()] {
            MockSelect::Strategy(key) => Ok(SelectorDecision::Strategy(key.clone())),
            MockSelect::Capacitation(capability) => Ok(SelectorDecision::CapacitationRequired {
                capability: capability.clone(),
            }),
            MockSelect::Error(msg) => anyhow::bail!("{msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_planner_cycles_and_counts() {
        let planner = MockPlanner::new(vec![
            MockPlan::Plan(ActionPlan::default()),
            MockPlan::Error("boom".to_string()),
        ]);

        assert!(planner.plan("o", "m").await.is_ok());
        assert!(planner.plan("o", "m").await.is_err());
        assert!(planner.plan("o", "m").await.is_ok());
        assert_eq!(planner.invocation_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_planner_next_objective() {
        let planner = MockPlanner::always(ActionPlan::default()).with_next_objective("evolve");
        assert_eq!(
            planner.propose_next("m").await.unwrap().as_deref(),
            Some("evolve")
        );
    }

    #[tokio::test]
    async fn test_mock_selector_capacitation() {
        let selector = MockSelector::new(vec![MockSelect::Capacitation("needs X".to_string())]);
        let decision = selector.select(&ActionPlan::default(), None).await.unwrap();
        assert_eq!(
            decision,
            SelectorDecision::CapacitationRequired {
                capability: "needs X".to_string()
            }
        );
    }
}
