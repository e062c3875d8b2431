//! Ephemeral project copies for trialing a strategy before it touches the
//! real tree.
//!
//! A sandbox is a plain filesystem copy of the project (VCS metadata and
//! engine state excluded) inside a temporary directory. The handle owns the
//! directory; dropping it removes the copy on every exit path, including
//! panics.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

/// Errors that can occur while building a sandbox copy.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The temporary directory could not be created.
    #[error("failed to create sandbox directory: {source}")]
    Create {
        #[source]
        source: std::io::Error,
    },

    /// Copying a file or directory into the sandbox failed.
    #[error("failed to copy {path} into sandbox: {source}")]
    Copy {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The project tree could not be walked.
    #[error("failed to walk project tree: {source}")]
    Walk {
        #[source]
        source: walkdir::Error,
    },
}

/// Directory names never copied into a sandbox.
const EXCLUDED_DIRS: &[&str] = &[".git", ".evo", "target", "__pycache__", "node_modules"];

/// Exclusive ownership of one sandbox copy.
///
/// The backing directory is removed when the handle drops.
#[derive(Debug)]
pub struct SandboxHandle {
    temp: TempDir,
    root: PathBuf,
}

impl SandboxHandle {
    /// Root of the copied project tree.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Removes the sandbox immediately, reporting any cleanup error.
    /// Dropping the handle removes it silently.
    pub fn release(self) -> std::io::Result<()> {
        self.temp.close()
    }
}

/// Creates sandbox copies of a project tree.
#[derive(Debug, Clone)]
pub struct SandboxManager {
    project_root: PathBuf,
}

impl SandboxManager {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Copies the whole project tree into a fresh temporary directory.
    pub fn acquire(&self) -> Result<SandboxHandle, SandboxError> {
        let temp = tempfile::Builder::new()
            .prefix("evo-sandbox-")
            .tempdir()
            .map_err(|source| SandboxError::Create { source })?;
        let root = temp.path().join(format!("tree-{}", Uuid::new_v4()));
        fs::create_dir_all(&root).map_err(|source| SandboxError::Create { source })?;

        let mut copied = 0usize;
        let walker = WalkDir::new(&self.project_root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| !is_excluded(entry.file_name()));

        for entry in walker {
            let entry = entry.map_err(|source| SandboxError::Walk { source })?;
            let Ok(rel) = entry.path().strip_prefix(&self.project_root) else {
                continue;
            };
            let dest = root.join(rel);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest).map_err(|source| SandboxError::Copy {
                    path: rel.display().to_string(),
                    source,
                })?;
            } else if entry.file_type().is_file() {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|source| SandboxError::Copy {
                        path: rel.display().to_string(),
                        source,
                    })?;
                }
                fs::copy(entry.path(), &dest).map_err(|source| SandboxError::Copy {
                    path: rel.display().to_string(),
                    source,
                })?;
                copied += 1;
            }
            // Symlinks are skipped; the sandbox only needs regular content.
        }

        debug!(
            "Sandbox ready at {} ({} files copied)",
            root.display(),
            copied
        );
        Ok(SandboxHandle { temp, root })
    }
}

fn is_excluded(name: &std::ffi::OsStr) -> bool {
    EXCLUDED_DIRS.iter().any(|d| name == *d)
}
