//! The step that applies the plan's patches to the tree it runs against.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{StepReport, ValidationStep};
use crate::patch::PatchApplicator;
use crate::plan::{PatchInstruction, ValidationOutcome};

/// Applies the plan's patch instructions, in order, to the base path.
pub struct ApplyPatchesStep {
    base_path: PathBuf,
    patches: Vec<PatchInstruction>,
}

impl ApplyPatchesStep {
    pub fn new(base_path: PathBuf, patches: Vec<PatchInstruction>) -> Self {
        Self { base_path, patches }
    }
}

#[async_trait]
impl ValidationStep for ApplyPatchesStep {
    fn name(&self) -> &'static str {
        "apply_patches_to_disk"
    }

    async fn execute(&self) -> StepReport {
        let applicator = PatchApplicator::new(&self.base_path);
        let report = applicator.apply_all(&self.patches);

        let outcome = match &report.failure {
            None => ValidationOutcome::ok(
                "PATCHES_APPLIED",
                format!("{} instruction(s) applied", self.patches.len()),
            ),
            Some(err) => ValidationOutcome::fail(err.reason_code(), err.to_string()),
        };

        StepReport {
            outcome,
            apply_statuses: Some(report.statuses),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{reason, PatchOperation};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_apply_step_reports_statuses() {
        let dir = tempdir().unwrap();
        let step = ApplyPatchesStep::new(
            dir.path().to_path_buf(),
            vec![PatchInstruction {
                operation: PatchOperation::Insert,
                file_path: "a.py".to_string(),
                match_text: None,
                content: Some("print(1)".to_string()),
                line_number: None,
            }],
        );

        let report = step.execute().await;
        assert!(report.outcome.success);
        let statuses = report.apply_statuses.unwrap();
        assert_eq!(statuses.get("a.py").unwrap(), "applied");
    }

    #[tokio::test]
    async fn test_apply_step_surfaces_block_not_found() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.py"), "a\n").unwrap();

        let step = ApplyPatchesStep::new(
            dir.path().to_path_buf(),
            vec![PatchInstruction {
                operation: PatchOperation::Delete,
                file_path: "f.py".to_string(),
                match_text: Some("missing".to_string()),
                content: None,
                line_number: None,
            }],
        );

        let report = step.execute().await;
        assert!(!report.outcome.success);
        assert_eq!(report.outcome.reason_code, reason::BLOCK_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_apply_step_empty_plan_succeeds() {
        let dir = tempdir().unwrap();
        let step = ApplyPatchesStep::new(dir.path().to_path_buf(), Vec::new());

        let report = step.execute().await;
        assert!(report.outcome.success);
    }
}
