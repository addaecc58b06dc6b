use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::state::{DocumentResult, RunReport};
use crate::checkpoint::CheckpointStore;
use crate::config::PipelineConfig;
use crate::errors::{VcsError, WorkflowError};
use crate::host::RepositoryHost;
use crate::oracle::CorrectionOracle;
use crate::tracker::VersionControl;
use crate::workflow::{RevisionWorkflow, document_label};

/// Runs documents one after another against a single working tree.
///
/// A failing document never stops the run: the error is logged, reported as
/// an issue on the host (best effort), the working tree is returned to the
/// base line, and the next document starts.
pub struct Orchestrator {
    config: PipelineConfig,
    vcs: Box<dyn VersionControl>,
    oracle: Arc<dyn CorrectionOracle>,
    host: Arc<dyn RepositoryHost>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        vcs: Box<dyn VersionControl>,
        oracle: Arc<dyn CorrectionOracle>,
        host: Arc<dyn RepositoryHost>,
    ) -> Self {
        Self {
            config,
            vcs,
            oracle,
            host,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Bring the working tree to an up-to-date base line.
    ///
    /// Leftovers of an interrupted run on a work branch are either committed
    /// (the checkpoint was saved, so the document write before it completed)
    /// or discarded (the unit will be redone). Uncommitted changes anywhere
    /// else are refused.
    pub fn prepare(&self) -> Result<(), VcsError> {
        if let Some(current) = self.vcs.current_branch()? {
            let dirty = self.vcs.dirty_paths()?;
            if !dirty.is_empty() {
                if !self.config.is_work_branch(&current) {
                    return Err(VcsError::DirtyWorktree { branch: current });
                }
                self.recover(&current, &dirty)?;
            }
        }

        let base = &self.config.base_branch;
        self.vcs.fetch()?;
        self.vcs.checkout(base)?;
        self.vcs.pull(base)?;
        tracing::info!(base = %base, "working tree ready");
        Ok(())
    }

    fn recover(&self, branch: &str, dirty: &[PathBuf]) -> Result<(), VcsError> {
        if dirty.iter().any(|p| CheckpointStore::is_checkpoint(p)) {
            tracing::warn!(branch, files = dirty.len(), "committing progress of an interrupted run");
            self.vcs
                .commit_all(&format!("recover interrupted progress on {}", branch))?;
            self.vcs.push(branch)?;
        } else {
            tracing::warn!(branch, files = dirty.len(), "discarding partial unit of an interrupted run");
            self.vcs.reset_to(branch)?;
        }
        Ok(())
    }

    /// Documents matching the configured glob, relative to the working tree,
    /// sorted. Checkpoint sidecars and hidden files are skipped.
    pub fn discover_documents(&self) -> Result<Vec<PathBuf>> {
        find_documents(&self.config.working_tree, &self.config.documents)
    }

    /// Process `documents` sequentially.
    pub async fn run(&self, documents: &[PathBuf]) -> RunReport {
        let mut report = RunReport::default();

        for document in documents {
            let label = document_label(document);
            if self.cancel.is_cancelled() {
                tracing::info!(document = %label, "run cancelled, not starting");
                report.push(document, DocumentResult::Skipped);
                continue;
            }

            let span = tracing::info_span!("document", document = %label);
            let result = async {
                let mut workflow = RevisionWorkflow::new(
                    &self.config,
                    self.vcs.as_ref(),
                    self.oracle.as_ref(),
                    self.host.as_ref(),
                    self.cancel.clone(),
                );
                workflow.run(document).await
            }
            .instrument(span)
            .await;

            match result {
                Ok(outcome) => {
                    tracing::info!(document = %label, outcome = %outcome, "document finished");
                    report.push(document, DocumentResult::Finished(outcome));
                }
                Err(err) => {
                    tracing::error!(document = %label, error = %err, "document failed");
                    let issue = self.report_failure(&label, &err).await;
                    self.restore_base();
                    report.push(
                        document,
                        DocumentResult::Failed {
                            error: err.to_string(),
                            issue,
                        },
                    );
                }
            }
        }

        tracing::info!(
            documents = report.documents.len(),
            failed = report.failures(),
            "run finished"
        );
        report
    }

    /// Open a tracking issue. Failures here are logged and swallowed.
    async fn report_failure(&self, label: &str, err: &WorkflowError) -> Option<u64> {
        let title = format!("Failed to process {}", label);
        let body = format!("```\n{}\n```", failure_text(err));
        match self.host.create_issue(&title, &body).await {
            Ok(issue) => Some(issue.number),
            Err(e) => {
                tracing::warn!(document = %label, error = %e, "could not open failure issue");
                None
            }
        }
    }

    fn restore_base(&self) {
        if let Err(e) = self.vcs.reset_to(&self.config.base_branch) {
            tracing::error!(error = %e, "could not return working tree to base line");
        }
    }
}

/// The error and every distinct cause below it, one per line.
fn failure_text(err: &WorkflowError) -> String {
    let mut lines = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let text = cause.to_string();
        if !lines.iter().any(|l| l.contains(&text)) {
            lines.push(format!("caused by: {}", text));
        }
        source = cause.source();
    }
    lines.join("\n")
}

/// Whether `path` is inside `root`'s documents; used by `run` to validate
/// explicit document arguments.
pub fn relative_document(root: &Path, path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        path.strip_prefix(root).ok().map(Path::to_path_buf)
    } else {
        Some(path.to_path_buf())
    }
}

/// Files under `root` matching the glob `documents`. Glob metacharacters in
/// `root` itself match literally.
fn find_documents(root: &Path, documents: &str) -> Result<Vec<PathBuf>> {
    let escaped = glob::Pattern::escape(&root.to_string_lossy());
    let pattern = Path::new(&escaped).join(documents);
    let pattern = pattern.to_string_lossy();
    let mut found = Vec::new();
    for entry in glob::glob(&pattern)
        .with_context(|| format!("Invalid documents pattern: {}", pattern))?
    {
        let path = entry.context("Failed to read a documents glob entry")?;
        if !path.is_file() || CheckpointStore::is_checkpoint(&path) {
            continue;
        }
        let hidden = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('.'));
        if hidden {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(root) {
            found.push(relative.to_path_buf());
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{OracleError, SegmentError};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_find_documents_under_root_with_glob_characters() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("drafts[1]");
        let lookalike = dir.path().join("drafts1");
        for tree in [&root, &lookalike] {
            fs::create_dir_all(tree.join("story")).unwrap();
        }
        fs::write(root.join("story/b.md"), "b\n").unwrap();
        fs::write(root.join("story/a.md"), "a\n").unwrap();
        fs::write(lookalike.join("story/other.md"), "x\n").unwrap();

        assert_eq!(
            find_documents(&root, "story/*.md").unwrap(),
            vec![PathBuf::from("story/a.md"), PathBuf::from("story/b.md")]
        );
    }

    #[test]
    fn test_failure_text_skips_repeated_causes() {
        let err = WorkflowError::OracleUnavailable(OracleError::Truncated);
        assert_eq!(
            failure_text(&err),
            "Correction oracle unavailable: Oracle stream ended before the response was complete"
        );
    }

    #[test]
    fn test_failure_text_includes_stale_source() {
        let err = WorkflowError::StaleDocument {
            path: PathBuf::from("story/a.md"),
            source: SegmentError::Mismatch {
                unit: 2,
                start: 10,
                end: 20,
            },
        };
        let text = failure_text(&err);
        assert!(text.starts_with("Document story/a.md changed underneath the pipeline"));
        assert!(text.contains("Unit 2"));
    }

    #[test]
    fn test_relative_document() {
        let root = Path::new("/data/repo");
        assert_eq!(
            relative_document(root, Path::new("/data/repo/story/a.md")),
            Some(PathBuf::from("story/a.md"))
        );
        assert_eq!(
            relative_document(root, Path::new("story/a.md")),
            Some(PathBuf::from("story/a.md"))
        );
        assert_eq!(relative_document(root, Path::new("/elsewhere/a.md")), None);
    }
}
