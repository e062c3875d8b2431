//! Plan and outcome types shared across the cycle engine.
//!
//! An [`ActionPlan`] is what the external planner returns for an objective:
//! an analysis string plus an ordered list of [`PatchInstruction`]s. The
//! validation pipeline and the engine communicate results through
//! [`ValidationOutcome`] values carrying a machine-readable reason code.

use serde::{Deserialize, Serialize};

/// Reason codes used in validation outcomes, the ledger, and the evolution
/// log. Kept as plain strings on the wire so external planners can consume
/// them without a shared schema.
pub mod reason {
    pub const STRATEGY_SUCCEEDED: &str = "STRATEGY_SUCCEEDED";
    pub const VALIDATION_SUCCESS_NO_CHANGES: &str = "VALIDATION_SUCCESS_NO_CHANGES";
    pub const BLOCK_NOT_FOUND: &str = "BLOCK_NOT_FOUND";
    pub const PATCH_APPLY_FAILED: &str = "PATCH_APPLY_FAILED";
    pub const SYNTAX_CHECK_FAILED: &str = "SYNTAX_CHECK_FAILED";
    pub const TESTS_FAILED: &str = "TESTS_FAILED";
    pub const UNKNOWN_VALIDATION_STEP: &str = "UNKNOWN_VALIDATION_STEP";
    pub const UNKNOWN_STRATEGY: &str = "UNKNOWN_STRATEGY";
    pub const PLANNING_FAILED: &str = "PLANNING_FAILED";
    pub const STRATEGY_SELECTION_FAILED: &str = "STRATEGY_SELECTION_FAILED";
    pub const CAPACITATION_REQUIRED: &str = "CAPACITATION_REQUIRED";
    pub const PROMOTION_FAILED: &str = "PROMOTION_FAILED";
    pub const COMMIT_FAILED_POST_SANITY: &str = "COMMIT_FAILED_POST_SANITY";
    pub const DEGENERATIVE_LOOP_DETECTED: &str = "DEGENERATIVE_LOOP_DETECTED";
    pub const REGRESSION_PREFIX: &str = "REGRESSION_DETECTED_BY_";
    pub const UNEXPECTED_ERROR: &str = "UNEXPECTED_ERROR";

    /// Reasons the engine retries with a synthesized correction objective.
    /// Anything outside this list is logged and the engine moves on.
    pub fn is_correctable(code: &str) -> bool {
        matches!(
            code,
            BLOCK_NOT_FOUND
                | PATCH_APPLY_FAILED
                | SYNTAX_CHECK_FAILED
                | TESTS_FAILED
                | UNKNOWN_VALIDATION_STEP
                | PROMOTION_FAILED
                | COMMIT_FAILED_POST_SANITY
        ) || code.starts_with(REGRESSION_PREFIX)
    }
}

/// One structured edit operation against one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchInstruction {
    pub operation: PatchOperation,
    pub file_path: String,
    /// Text to locate in the target file. `None` means "whole file" for
    /// replace/delete. Tried as an exact substring first, then as a regex.
    #[serde(default, rename = "match")]
    pub match_text: Option<String>,
    /// Replacement or inserted content. `None` is treated as empty.
    #[serde(default)]
    pub content: Option<String>,
    /// 1-indexed insertion point. `None` or beyond EOF appends; 0 or 1
    /// prepends.
    #[serde(default)]
    pub line_number: Option<usize>,
}

/// The kind of edit a [`PatchInstruction`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatchOperation {
    Insert,
    Replace,
    Delete,
}

impl std::fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Replace => write!(f, "REPLACE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// What the external planner returns for one objective.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionPlan {
    /// Free-form analysis of the objective.
    #[serde(default)]
    pub analysis: String,
    /// Ordered edits; applied strictly in list order.
    #[serde(default)]
    pub patches_to_apply: Vec<PatchInstruction>,
}

impl ActionPlan {
    /// Distinct file paths referenced by the plan, in first-seen order.
    pub fn touched_files(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for patch in &self.patches_to_apply {
            if !seen.contains(&patch.file_path) {
                seen.push(patch.file_path.clone());
            }
        }
        seen
    }
}

/// The atomic result every validation step and the whole pipeline produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub success: bool,
    pub reason_code: String,
    pub details: String,
}

impl ValidationOutcome {
    pub fn ok(reason_code: &str, details: impl Into<String>) -> Self {
        Self {
            success: true,
            reason_code: reason_code.to_string(),
            details: details.into(),
        }
    }

    pub fn fail(reason_code: &str, details: impl Into<String>) -> Self {
        Self {
            success: false,
            reason_code: reason_code.to_string(),
            details: details.into(),
        }
    }
}

/// A named, ordered step list plus an optional post-promotion sanity check.
///
/// Resolved from a strategy key in `evo.toml` before execution starts;
/// immutable once selected for a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationStrategy {
    pub steps: Vec<String>,
    /// Step re-run against the real tree after promotion. `None` means no
    /// sanity check is configured and no rollback gate exists.
    #[serde(default, rename = "sanity_check")]
    pub sanity_check_step: Option<String>,
}
