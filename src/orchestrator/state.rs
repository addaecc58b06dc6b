use std::fs::{self, File, OpenOptions};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::workflow::{WorkflowOutcome, document_label};

const LOCK_SUFFIX: &str = "proofreader.lock";

/// What happened to one document during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentResult {
    Finished(WorkflowOutcome),
    /// The workflow failed; `issue` is the tracking issue, if one was opened.
    Failed { error: String, issue: Option<u64> },
    /// Not started because the run was cancelled.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReport {
    pub document: PathBuf,
    pub result: DocumentResult,
}

/// Per-document results of one orchestrator run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub documents: Vec<DocumentReport>,
}

impl RunReport {
    pub fn push(&mut self, document: &Path, result: DocumentResult) {
        self.documents.push(DocumentReport {
            document: document.to_path_buf(),
            result,
        });
    }

    pub fn failures(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| matches!(d.result, DocumentResult::Failed { .. }))
            .count()
    }

    pub fn result_for(&self, document: &Path) -> Option<&DocumentResult> {
        self.documents
            .iter()
            .find(|d| d.document == document)
            .map(|d| &d.result)
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.documents.is_empty() {
            return writeln!(f, "No documents processed.");
        }
        for entry in &self.documents {
            let label = document_label(&entry.document);
            match &entry.result {
                DocumentResult::Finished(outcome) => writeln!(f, "{}: {}", label, outcome)?,
                DocumentResult::Failed {
                    error,
                    issue: Some(number),
                } => writeln!(f, "{}: failed: {} (issue #{})", label, error, number)?,
                DocumentResult::Failed { error, issue: None } => {
                    writeln!(f, "{}: failed: {}", label, error)?
                }
                DocumentResult::Skipped => writeln!(f, "{}: skipped", label)?,
            }
        }
        Ok(())
    }
}

/// Exclusive lock on a working tree; one orchestrator per tree.
///
/// The lock file sits next to the working tree (`<tree>.proofreader.lock`),
/// so it can be taken before the tree is cloned and is never committed.
/// Released on drop.
#[derive(Debug)]
pub struct WorktreeLock {
    file: File,
    path: PathBuf,
}

impl WorktreeLock {
    pub fn acquire(working_tree: &Path) -> Result<Self> {
        let path = lock_path(working_tree)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
        file.try_lock_exclusive().with_context(|| {
            format!(
                "Working tree {} is locked by another proofreader run",
                working_tree.display()
            )
        })?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(working_tree: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(working_tree)
        .with_context(|| format!("Failed to resolve {}", working_tree.display()))?;
    let tree: PathBuf = absolute
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let name = tree.file_name().with_context(|| {
        format!(
            "Working tree {} has no directory name to lock",
            working_tree.display()
        )
    })?;
    Ok(tree.with_file_name(format!("{}.{}", name.to_string_lossy(), LOCK_SUFFIX)))
}

impl Drop for WorktreeLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PullRequest;
    use tempfile::tempdir;

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("work");
        fs::create_dir(&tree).unwrap();
        let lock = WorktreeLock::acquire(&tree).unwrap();
        assert_eq!(lock.path(), dir.path().join("work.proofreader.lock"));

        let err = WorktreeLock::acquire(&tree).unwrap_err();
        assert!(err.to_string().contains("locked by another proofreader run"));

        drop(lock);
        assert!(WorktreeLock::acquire(&tree).is_ok());
    }

    #[test]
    fn test_lock_before_clone_leaves_tree_untouched() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("not-cloned-yet");
        let lock = WorktreeLock::acquire(&tree).unwrap();

        assert!(!tree.exists());
        assert!(lock.path().exists());
        assert!(WorktreeLock::acquire(&tree.join(".")).is_err());
    }

    #[test]
    fn test_report_display_and_failures() {
        let mut report = RunReport::default();
        report.push(
            Path::new("story/a.md"),
            DocumentResult::Finished(WorkflowOutcome::Completed {
                branch: "proofread/story/a.md".to_string(),
                pull_request: PullRequest {
                    number: 3,
                    html_url: "https://github.com/o/r/pull/3".to_string(),
                },
            }),
        );
        report.push(
            Path::new("story/b.md"),
            DocumentResult::Failed {
                error: "push rejected".to_string(),
                issue: Some(4),
            },
        );
        report.push(Path::new("story/c.md"), DocumentResult::Skipped);

        assert_eq!(report.failures(), 1);
        assert_eq!(
            report.to_string(),
            "story/a.md: pull request #3 opened\n\
             story/b.md: failed: push rejected (issue #4)\n\
             story/c.md: skipped\n"
        );
        assert_eq!(
            report.result_for(Path::new("story/c.md")),
            Some(&DocumentResult::Skipped)
        );
    }

    #[test]
    fn test_empty_report() {
        assert_eq!(RunReport::default().to_string(), "No documents processed.\n");
    }
}
