//! Per-document revision workflow.
//!
//! One run takes a document from the base line to an open pull request:
//! resolve the revision branch, correct units one at a time (each unit is
//! written, checkpointed, committed and pushed before the next one starts),
//! then open the pull request and remove the checkpoint. A run that stops
//! early resumes from the checkpoint on the branch.

pub mod identity;
pub mod state;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointStore, UnitOutcome};
use crate::config::PipelineConfig;
use crate::errors::{PersistenceError, WorkflowError};
use crate::host::{NewPullRequest, PullRequest, RepositoryHost};
use crate::notes::{format_duration, render_pull_request_body};
use crate::oracle::CorrectionOracle;
use crate::policy::{AcceptancePolicy, Correction, correct_unit};
use crate::segment::segment;
use crate::tracker::VersionControl;

pub use identity::{RevisionIdentity, document_label};
pub use state::WorkflowState;

/// How a document's run ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// Every unit processed, pull request opened, checkpoint removed.
    Completed {
        branch: String,
        pull_request: PullRequest,
    },
    /// A pull request for this revision exists already; nothing was written.
    AlreadyDone { branch: String },
    /// The document has no correctable content.
    NothingToCorrect,
    /// Cancellation was requested; `next_unit` is where a later run resumes.
    Interrupted { branch: String, next_unit: usize },
}

impl std::fmt::Display for WorkflowOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowOutcome::Completed { pull_request, .. } => {
                write!(f, "pull request #{} opened", pull_request.number)
            }
            WorkflowOutcome::AlreadyDone { branch } => {
                write!(f, "already done (branch {})", branch)
            }
            WorkflowOutcome::NothingToCorrect => write!(f, "nothing to correct"),
            WorkflowOutcome::Interrupted { next_unit, .. } => {
                write!(f, "interrupted, resumes at unit {}", next_unit + 1)
            }
        }
    }
}

/// Drives one document through the revision lifecycle.
pub struct RevisionWorkflow<'a> {
    config: &'a PipelineConfig,
    vcs: &'a dyn VersionControl,
    oracle: &'a dyn CorrectionOracle,
    host: &'a dyn RepositoryHost,
    store: CheckpointStore,
    policy: AcceptancePolicy,
    cancel: CancellationToken,
    state: WorkflowState,
}

impl<'a> RevisionWorkflow<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        vcs: &'a dyn VersionControl,
        oracle: &'a dyn CorrectionOracle,
        host: &'a dyn RepositoryHost,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            vcs,
            oracle,
            host,
            store: CheckpointStore::new(&config.working_tree),
            policy: config.policy(),
            cancel,
            state: WorkflowState::Idle,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    fn enter(&mut self, next: WorkflowState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal workflow transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "workflow transition");
        self.state = next;
    }

    fn document_path(&self, document: &Path) -> PathBuf {
        self.config.working_tree.join(document)
    }

    fn read_document(&self, document: &Path) -> Result<String, PersistenceError> {
        let path = self.document_path(document);
        fs::read_to_string(&path).map_err(|source| PersistenceError::Document { path, source })
    }

    fn write_document(&self, document: &Path, text: &str) -> Result<(), PersistenceError> {
        let path = self.document_path(document);
        fs::write(&path, text).map_err(|source| PersistenceError::Document { path, source })
    }

    /// Run the workflow for `document`, a path relative to the working tree.
    pub async fn run(&mut self, document: &Path) -> Result<WorkflowOutcome, WorkflowError> {
        let label = document_label(document);
        let base = self.config.base_branch.as_str();
        self.enter(WorkflowState::BranchResolving);

        self.vcs.checkout(base)?;
        let change = self.vcs.last_change(base, document)?;
        let identity = RevisionIdentity::new(document, &change, self.oracle.model());
        let branch = identity.branch_name(&self.config.branch_prefix)?;
        tracing::info!(document = %label, branch = %branch, commit = %identity.short_hash(), "resolved revision");

        if self.host.pull_request_exists(&branch).await? {
            tracing::info!(document = %label, branch = %branch, "pull request exists, skipping");
            self.enter(WorkflowState::AlreadyDone);
            return Ok(WorkflowOutcome::AlreadyDone { branch });
        }

        // Offsets are computed once, against the base line.
        let base_text = self.read_document(document)?;
        let units = segment(&base_text);
        if units.is_empty() {
            tracing::info!(document = %label, "no correction units");
            self.enter(WorkflowState::NothingToCorrect);
            return Ok(WorkflowOutcome::NothingToCorrect);
        }

        if self.vcs.branch_exists(&branch)? {
            tracing::info!(branch = %branch, "resuming existing branch");
            self.vcs.checkout(&branch)?;
        } else {
            self.vcs.checkout_new_branch(&branch)?;
        }
        self.enter(WorkflowState::BranchReady);

        let mut checkpoint = self.store.load(document)?;
        let mut text = self.read_document(document)?;
        let total = units.len();
        if checkpoint.unit_index > 0 {
            tracing::info!(document = %label, next_unit = checkpoint.unit_index, total, "loaded checkpoint");
        }

        for unit in units.iter().skip(checkpoint.unit_index) {
            if self.cancel.is_cancelled() {
                tracing::warn!(document = %label, next_unit = unit.index, "cancelled before unit");
                self.enter(WorkflowState::Interrupted);
                return Ok(WorkflowOutcome::Interrupted {
                    branch,
                    next_unit: unit.index,
                });
            }

            self.enter(WorkflowState::ProcessingUnit(unit.index));
            unit.verify(&text)
                .map_err(|source| WorkflowError::StaleDocument {
                    path: document.to_path_buf(),
                    source,
                })?;

            let started = Instant::now();
            let report = correct_unit(&self.policy, self.oracle, unit).await?;
            for note in report.rejections {
                checkpoint.note(note);
            }

            let outcome = match report.correction {
                Correction::Accepted(candidate) => {
                    let updated = unit.splice(&text, &candidate).map_err(|source| {
                        WorkflowError::StaleDocument {
                            path: document.to_path_buf(),
                            source,
                        }
                    })?;
                    if updated == text {
                        UnitOutcome::Unchanged
                    } else {
                        text = updated;
                        UnitOutcome::Corrected
                    }
                }
                Correction::RetriesExhausted => UnitOutcome::RetriesExhausted,
            };
            let unit_elapsed = started.elapsed();
            checkpoint.advance(unit, outcome);
            checkpoint.elapsed(unit_elapsed);

            self.enter(WorkflowState::Committing(unit.index));
            self.write_document(document, &text)?;
            self.store.save(document, &checkpoint)?;
            let message = format!(
                "correct {} unit {} of {}\n\nTime needed: **{}**",
                label,
                unit.index + 1,
                total,
                format_duration(unit_elapsed)
            );
            self.vcs.commit_all(&message)?;
            self.vcs.push(&branch)?;
            tracing::info!(
                document = %label,
                unit = unit.index + 1,
                total,
                outcome = ?outcome,
                attempts = report.attempts,
                "unit done"
            );
        }

        self.enter(WorkflowState::Finalizing);
        let request = NewPullRequest {
            title: format!("Correct {} {}", label, identity.date()),
            head: branch.clone(),
            base: base.to_string(),
            body: render_pull_request_body(&checkpoint.notes, checkpoint.total_elapsed()),
        };
        let pull_request = self.host.create_pull_request(&request).await?;
        self.enter(WorkflowState::PullRequestOpen);

        self.store.clear(document)?;
        self.vcs.commit_all(&format!("correct {} clean up", label))?;
        self.vcs.push(&branch)?;
        self.vcs.checkout(base)?;
        self.enter(WorkflowState::Cleaned);
        tracing::info!(
            document = %label,
            pull_request = pull_request.number,
            elapsed = %format_duration(checkpoint.total_elapsed()),
            "document done"
        );

        Ok(WorkflowOutcome::Completed {
            branch,
            pull_request,
        })
    }
}
