//! Copies validated sandbox changes back into the real working tree.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

/// What happened to one promoted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotedChange {
    Copied,
    Deleted,
    /// Absent on both sides; nothing to do.
    Missing,
}

/// Promotes the plan's files from a validated sandbox into the real tree.
///
/// For each path: present in the sandbox means copy it over the real file
/// (creating parents); absent in the sandbox but present in the real tree
/// means the strategy deleted it, so delete the real file too. Any IO error
/// aborts the promotion and fails the cycle.
pub struct PromotionManager<'a> {
    sandbox_root: &'a Path,
    project_root: &'a Path,
}

impl<'a> PromotionManager<'a> {
    pub fn new(sandbox_root: &'a Path, project_root: &'a Path) -> Self {
        Self {
            sandbox_root,
            project_root,
        }
    }

    /// Promotes every listed file, returning the per-path changes.
    pub fn promote(&self, file_paths: &[String]) -> Result<Vec<(String, PromotedChange)>> {
        let mut changes = Vec::with_capacity(file_paths.len());
        for file_path in file_paths {
            let change = self.promote_one(file_path)?;
            changes.push((file_path.clone(), change));
        }
        info!("Promoted {} path(s) into the working tree", changes.len());
        Ok(changes)
    }

    fn promote_one(&self, file_path: &str) -> Result<PromotedChange> {
        let source = self.sandbox_root.join(file_path);
        let dest = self.project_root.join(file_path);

        if source.exists() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::copy(&source, &dest).with_context(|| {
                format!(
                    "Failed to copy {} from sandbox into working tree",
                    file_path
                )
            })?;
            debug!("Promoted {}", file_path);
            Ok(PromotedChange::Copied)
        } else if dest.exists() {
            fs::remove_file(&dest)
                .with_context(|| format!("Failed to delete {} from working tree", file_path))?;
            debug!("Deleted {} (removed in sandbox)", file_path);
            Ok(PromotedChange::Deleted)
        } else {
            Ok(PromotedChange::Missing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_promote_copies_sandbox_files() {
        let sandbox = tempdir().unwrap();
        let project = tempdir().unwrap();
        fs::write(sandbox.path().join("a.py"), "new\n").unwrap();
        fs::write(project.path().join("a.py"), "old\n").unwrap();

        let manager = PromotionManager::new(sandbox.path(), project.path());
        let changes = manager.promote(&["a.py".to_string()]).unwrap();

        assert_eq!(changes, vec![("a.py".to_string(), PromotedChange::Copied)]);
        assert_eq!(
            fs::read_to_string(project.path().join("a.py")).unwrap(),
            "new\n"
        );
    }

    #[test]
    fn test_promote_creates_parent_directories() {
        let sandbox = tempdir().unwrap();
        let project = tempdir().unwrap();
        fs::create_dir_all(sandbox.path().join("pkg/sub")).unwrap();
        fs::write(sandbox.path().join("pkg/sub/new.py"), "x\n").unwrap();

        let manager = PromotionManager::new(sandbox.path(), project.path());
        manager.promote(&["pkg/sub/new.py".to_string()]).unwrap();

        assert!(project.path().join("pkg/sub/new.py").exists());
    }

    #[test]
    fn test_promote_deletes_files_removed_in_sandbox() {
        let sandbox = tempdir().unwrap();
        let project = tempdir().unwrap();
        fs::write(project.path().join("gone.py"), "old\n").unwrap();

        let manager = PromotionManager::new(sandbox.path(), project.path());
        let changes = manager.promote(&["gone.py".to_string()]).unwrap();

        assert_eq!(
            changes,
            vec![("gone.py".to_string(), PromotedChange::Deleted)]
        );
        assert!(!project.path().join("gone.py").exists());
    }

    #[test]
    fn test_promote_missing_on_both_sides_is_noop() {
        let sandbox = tempdir().unwrap();
        let project = tempdir().unwrap();

        let manager = PromotionManager::new(sandbox.path(), project.path());
        let changes = manager.promote(&["phantom.py".to_string()]).unwrap();

        assert_eq!(
            changes,
            vec![("phantom.py".to_string(), PromotedChange::Missing)]
        );
    }
}
