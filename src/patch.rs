//! Applies structured edit instructions to files under a base path.
//!
//! Match resolution for REPLACE/DELETE tries the `match` text as an exact
//! substring first, then as a regex; the first occurrence wins. A match that
//! resolves nowhere is a normal, reportable failure (`BLOCK_NOT_FOUND`),
//! never a crash.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::plan::{reason, PatchInstruction, PatchOperation};

/// Errors produced while applying a single patch instruction.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// The match text was not found in the target file.
    #[error("match not found in {file}")]
    BlockNotFound { file: String },

    /// The file path escapes the base directory or is otherwise unusable.
    #[error("invalid patch path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// Filesystem operation failed.
    #[error("io error on {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    fn io(file: &str, source: std::io::Error) -> Self {
        Self::Io {
            file: file.to_string(),
            source,
        }
    }

    /// Maps this error onto the reason code reported by the apply step.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::BlockNotFound { .. } => reason::BLOCK_NOT_FOUND,
            Self::InvalidPath { .. } | Self::Io { .. } => reason::PATCH_APPLY_FAILED,
        }
    }
}

/// Per-file apply status plus the first failure, if any.
///
/// Instructions are applied strictly in list order; a failure aborts the
/// remaining instructions.
#[derive(Debug)]
pub struct ApplyReport {
    /// File path → human-readable status ("applied" or the error text).
    pub statuses: BTreeMap<String, String>,
    /// First failure encountered, if the apply run aborted.
    pub failure: Option<PatchError>,
}

impl ApplyReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Applies [`PatchInstruction`]s to files resolved relative to a base path.
pub struct PatchApplicator {
    base_path: PathBuf,
}

impl PatchApplicator {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Applies instructions in order, stopping at the first failure.
    pub fn apply_all(&self, patches: &[PatchInstruction]) -> ApplyReport {
        let mut statuses = BTreeMap::new();
        for patch in patches {
            match self.apply(patch) {
                Ok(()) => {
                    statuses.insert(patch.file_path.clone(), "applied".to_string());
                }
                Err(e) => {
                    statuses.insert(patch.file_path.clone(), e.to_string());
                    return ApplyReport {
                        statuses,
                        failure: Some(e),
                    };
                }
            }
        }
        ApplyReport {
            statuses,
            failure: None,
        }
    }

    /// Applies one instruction.
    pub fn apply(&self, patch: &PatchInstruction) -> Result<(), PatchError> {
        let target = self.resolve(&patch.file_path)?;
        debug!(
            "Applying {} to {} (match: {})",
            patch.operation,
            target.display(),
            patch.match_text.is_some()
        );
        match patch.operation {
            PatchOperation::Insert => self.insert(&target, patch),
            PatchOperation::Replace => self.replace(&target, patch),
            PatchOperation::Delete => self.delete(&target, patch),
        }
    }

    /// Resolves a patch path under the base, rejecting absolute paths and
    /// parent-directory traversal.
    fn resolve(&self, file_path: &str) -> Result<PathBuf, PatchError> {
        let rel = Path::new(file_path);
        if rel.is_absolute() {
            return Err(PatchError::InvalidPath {
                path: file_path.to_string(),
                message: "absolute paths are not allowed".to_string(),
            });
        }
        for component in rel.components() {
            if matches!(component, Component::ParentDir) {
                return Err(PatchError::InvalidPath {
                    path: file_path.to_string(),
                    message: "path escapes the project root".to_string(),
                });
            }
        }
        Ok(self.base_path.join(rel))
    }

    fn insert(&self, target: &Path, patch: &PatchInstruction) -> Result<(), PatchError> {
        let content = patch.content.as_deref().unwrap_or("");

        if !target.exists() {
            create_parent_dirs(target, &patch.file_path)?;
            fs::write(target, content).map_err(|e| PatchError::io(&patch.file_path, e))?;
            return Ok(());
        }

        let mut text =
            fs::read_to_string(target).map_err(|e| PatchError::io(&patch.file_path, e))?;

        let offset = match patch.line_number {
            None => text.len(),
            Some(0) | Some(1) => 0,
            Some(n) => line_start_offset(&text, n).unwrap_or(text.len()),
        };
        let offset = offset.min(text.len());

        // When appending to a file with no final newline, splice the block
        // onto a fresh line without touching the existing bytes: the file
        // stays unterminated, and deleting the block restores it exactly.
        let mut block = String::with_capacity(content.len() + 1);
        if offset == text.len() && !text.is_empty() && !text.ends_with('\n') {
            block.push('\n');
            block.push_str(content);
        } else {
            block.push_str(content);
            if !block.ends_with('\n') {
                block.push('\n');
            }
        }

        text.insert_str(offset, &block);
        fs::write(target, text).map_err(|e| PatchError::io(&patch.file_path, e))
    }

    fn replace(&self, target: &Path, patch: &PatchInstruction) -> Result<(), PatchError> {
        let content = patch.content.as_deref().unwrap_or("");

        let Some(match_text) = patch.match_text.as_deref() else {
            // Whole-file replace, creating the file if absent.
            create_parent_dirs(target, &patch.file_path)?;
            return fs::write(target, content).map_err(|e| PatchError::io(&patch.file_path, e));
        };

        let mut text =
            fs::read_to_string(target).map_err(|e| PatchError::io(&patch.file_path, e))?;
        let (start, end) = find_match(&text, match_text).ok_or_else(|| {
            PatchError::BlockNotFound {
                file: patch.file_path.clone(),
            }
        })?;
        text.replace_range(start..end, content);
        fs::write(target, text).map_err(|e| PatchError::io(&patch.file_path, e))
    }

    fn delete(&self, target: &Path, patch: &PatchInstruction) -> Result<(), PatchError> {
        let Some(match_text) = patch.match_text.as_deref() else {
            if target.exists() {
                fs::remove_file(target).map_err(|e| PatchError::io(&patch.file_path, e))?;
            }
            return Ok(());
        };

        let mut text =
            fs::read_to_string(target).map_err(|e| PatchError::io(&patch.file_path, e))?;
        let (mut start, mut end) = find_match(&text, match_text).ok_or_else(|| {
            PatchError::BlockNotFound {
                file: patch.file_path.clone(),
            }
        })?;

        // A block spanning whole lines takes its line separator with it,
        // so inserting a line and deleting the same text round-trips exactly.
        // For the last line of an unterminated file the separator sits in
        // front of the block instead of after it.
        let at_line_start = start == 0 || text.as_bytes()[start - 1] == b'\n';
        let ends_mid_line = !match_text.ends_with('\n');
        if at_line_start && ends_mid_line {
            if text.as_bytes().get(end) == Some(&b'\n') {
                end += 1;
            } else if end == text.len() && start > 0 {
                start -= 1;
            }
        }

        text.replace_range(start..end, "");
        fs::write(target, text).map_err(|e| PatchError::io(&patch.file_path, e))
    }
}

/// Byte range of the first occurrence: exact substring first, regex second.
/// An invalid regex after a literal miss is treated as "not found".
fn find_match(text: &str, pattern: &str) -> Option<(usize, usize)> {
    if let Some(start) = text.find(pattern) {
        return Some((start, start + pattern.len()));
    }
    let re = Regex::new(pattern).ok()?;
    re.find(text).map(|m| (m.start(), m.end()))
}

/// Byte offset of the start of the 1-indexed line, or `None` past EOF.
fn line_start_offset(text: &str, line: usize) -> Option<usize> {
    if line <= 1 {
        return Some(0);
    }
    let mut current = 1usize;
    for (idx, ch) in text.char_indices() {
        if ch == '\n' {
            current += 1;
            if current == line {
                return Some(idx + 1);
            }
        }
    }
    None
}

fn create_parent_dirs(target: &Path, file_path: &str) -> Result<(), PatchError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| PatchError::io(file_path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn insert(file: &str, content: &str, line: Option<usize>) -> PatchInstruction {
        PatchInstruction {
            operation: PatchOperation::Insert,
            file_path: file.to_string(),
            match_text: None,
            content: Some(content.to_string()),
            line_number: line,
        }
    }

    fn replace(file: &str, m: Option<&str>, content: &str) -> PatchInstruction {
        PatchInstruction {
            operation: PatchOperation::Replace,
            file_path: file.to_string(),
            match_text: m.map(String::from),
            content: Some(content.to_string()),
            line_number: None,
        }
    }

    fn delete(file: &str, m: Option<&str>) -> PatchInstruction {
        PatchInstruction {
            operation: PatchOperation::Delete,
            file_path: file.to_string(),
            match_text: m.map(String::from),
            content: None,
            line_number: None,
        }
    }

    #[test]
    fn test_insert_creates_missing_file_with_exact_content() {
        let dir = tempdir().unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&insert("a.py", "print(1)", None)).unwrap();

        let written = fs::read_to_string(dir.path().join("a.py")).unwrap();
        assert_eq!(written, "print(1)");
    }

    #[test]
    fn test_insert_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator
            .apply(&insert("pkg/sub/mod.py", "x = 1", None))
            .unwrap();

        assert!(dir.path().join("pkg/sub/mod.py").exists());
    }

    #[test]
    fn test_insert_appends_at_end() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.py"), "a\nb\n").unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&insert("f.py", "c", None)).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("f.py")).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn test_insert_appends_when_line_beyond_eof() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.py"), "a\nb\n").unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&insert("f.py", "c", Some(99))).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("f.py")).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn test_insert_prepends_at_line_one_and_zero() {
        for line in [0usize, 1] {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("f.py"), "a\nb\n").unwrap();
            let applicator = PatchApplicator::new(dir.path());

            applicator.apply(&insert("f.py", "top", Some(line))).unwrap();

            assert_eq!(
                fs::read_to_string(dir.path().join("f.py")).unwrap(),
                "top\na\nb\n"
            );
        }
    }

    #[test]
    fn test_insert_splices_mid_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.py"), "a\nb\nc\n").unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&insert("f.py", "mid", Some(2))).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("f.py")).unwrap(),
            "a\nmid\nb\nc\n"
        );
    }

    #[test]
    fn test_replace_whole_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.py"), "old content\n").unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&replace("b.py", None, "x=1")).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("b.py")).unwrap(), "x=1");
    }

    #[test]
    fn test_replace_whole_file_creates_missing_file() {
        let dir = tempdir().unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&replace("new.py", None, "x=1")).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("new.py")).unwrap(), "x=1");
    }

    #[test]
    fn test_replace_first_literal_occurrence_only() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.py"), "x = 1\nx = 1\n").unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&replace("f.py", Some("x = 1"), "x = 2")).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("f.py")).unwrap(),
            "x = 2\nx = 1\n"
        );
    }

    #[test]
    fn test_replace_falls_back_to_regex() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.py"), "version = 3\n").unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator
            .apply(&replace("f.py", Some(r"version = \d+"), "version = 4"))
            .unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("f.py")).unwrap(),
            "version = 4\n"
        );
    }

    #[test]
    fn test_replace_missing_match_is_block_not_found() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.py"), "a\n").unwrap();
        let applicator = PatchApplicator::new(dir.path());

        let err = applicator
            .apply(&replace("f.py", Some("nope"), "x"))
            .unwrap_err();

        assert!(matches!(err, PatchError::BlockNotFound { .. }));
        assert_eq!(err.reason_code(), reason::BLOCK_NOT_FOUND);
    }

    #[test]
    fn test_delete_whole_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.py"), "a\n").unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&delete("f.py", None)).unwrap();

        assert!(!dir.path().join("f.py").exists());
    }

    #[test]
    fn test_delete_block_removes_whole_line() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.py"), "a\nX\nb\n").unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&delete("f.py", Some("X"))).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("f.py")).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_delete_mid_line_keeps_newline() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.py"), "abcdef\n").unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&delete("f.py", Some("cde"))).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("f.py")).unwrap(), "abf\n");
    }

    #[test]
    fn test_insert_then_delete_round_trips_exactly() {
        let dir = tempdir().unwrap();
        let before = "a\nb\nc\n";
        fs::write(dir.path().join("f.py"), before).unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&insert("f.py", "X", Some(5))).unwrap();
        applicator.apply(&delete("f.py", Some("X"))).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("f.py")).unwrap(), before);
    }

    #[test]
    fn test_insert_then_delete_round_trips_at_start() {
        let dir = tempdir().unwrap();
        let before = "a\nb\n";
        fs::write(dir.path().join("f.py"), before).unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&insert("f.py", "X", Some(1))).unwrap();
        applicator.apply(&delete("f.py", Some("X"))).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("f.py")).unwrap(), before);
    }

    #[test]
    fn test_insert_then_delete_round_trips_without_final_newline() {
        let dir = tempdir().unwrap();
        let before = "a\nb\nc";
        fs::write(dir.path().join("f.py"), before).unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&insert("f.py", "X", Some(5))).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("f.py")).unwrap(),
            "a\nb\nc\nX"
        );

        applicator.apply(&delete("f.py", Some("X"))).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("f.py")).unwrap(), before);
    }

    #[test]
    fn test_append_keeps_unterminated_file_unterminated() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.py"), "a\nb").unwrap();
        let applicator = PatchApplicator::new(dir.path());

        applicator.apply(&insert("f.py", "c", None)).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("f.py")).unwrap(), "a\nb\nc");
    }

    #[test]
    fn test_apply_all_aborts_after_first_failure() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.py"), "a\n").unwrap();
        let applicator = PatchApplicator::new(dir.path());

        let patches = vec![
            replace("f.py", Some("missing"), "x"),
            insert("never.py", "should not exist", None),
        ];
        let report = applicator.apply_all(&patches);

        assert!(!report.succeeded());
        assert!(matches!(report.failure, Some(PatchError::BlockNotFound { .. })));
        assert!(!dir.path().join("never.py").exists());
        assert_eq!(report.statuses.len(), 1);
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let dir = tempdir().unwrap();
        let applicator = PatchApplicator::new(dir.path());

        let err = applicator.apply(&insert("../escape.py", "x", None)).unwrap_err();
        assert!(matches!(err, PatchError::InvalidPath { .. }));

        let err = applicator.apply(&insert("/etc/passwd", "x", None)).unwrap_err();
        assert!(matches!(err, PatchError::InvalidPath { .. }));
    }
}
