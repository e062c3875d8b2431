//! Renders the compact project manifest handed to the external planner.

use std::path::Path;

use walkdir::WalkDir;

use crate::vcs::VcsGateway;

const SKIPPED_DIRS: &[&str] = &[".git", ".evo", "target", "__pycache__", "node_modules"];
const MAX_LISTED_FILES: usize = 400;
const RECENT_COMMITS: usize = 10;

/// Renders a listing of project files plus recent commit subjects.
pub async fn render(project_root: &Path, vcs: &VcsGateway) -> String {
    let mut lines = vec!["# Project manifest".to_string(), String::new()];

    let mut files: Vec<(String, u64)> = WalkDir::new(project_root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !SKIPPED_DIRS.iter().any(|d| e.file_name() == *d))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let rel = e.path().strip_prefix(project_root).ok()?;
            let size = e.metadata().ok()?.len();
            Some((rel.display().to_string(), size))
        })
        .collect();
    files.sort();

    let total = files.len();
    lines.push(format!("## Files ({total})"));
    for (path, size) in files.into_iter().take(MAX_LISTED_FILES) {
        lines.push(format!("- {path} ({size} bytes)"));
    }
    if total > MAX_LISTED_FILES {
        lines.push(format!("- ... and {} more", total - MAX_LISTED_FILES));
    }

    let commits = vcs.recent_subjects(RECENT_COMMITS).await;
    if !commits.is_empty() {
        lines.push(String::new());
        lines.push("## Recent commits".to_string());
        for subject in commits {
            lines.push(format!("- {subject}"));
        }
    }

    lines.join("\n")
}
