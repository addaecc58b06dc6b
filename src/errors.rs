//! Typed error hierarchy for the proofreading pipeline.
//!
//! Leaf enums belong to one collaborator each:
//! - `OracleError`: transport or oracle-side failure while streaming a correction
//! - `CheckpointError`: checkpoint sidecar read/write failures
//! - `VcsError`: version-control failures (local or remote)
//! - `HostError`: repository host API failures
//! - `SegmentError`: unit offsets that no longer match the document
//!
//! `WorkflowError` is what aborts a single document; the orchestrator catches
//! it and moves on to the next document.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the correction oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle transport failed: {0}")]
    Transport(String),

    #[error("Oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Oracle reported an error: {0}")]
    Remote(String),

    #[error("Oracle stream ended before the response was complete")]
    Truncated,

    #[error("Failed to decode oracle stream line: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Model {model} is not available on the oracle")]
    ModelMissing { model: String },
}

/// Errors from the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to access checkpoint at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint at {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the version-control layer.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("No commit touches {path} on {reference}")]
    NoHistory { path: PathBuf, reference: String },

    #[error("Push of {branch} was rejected: {message}")]
    PushRejected { branch: String, message: String },

    #[error("Branch {branch} cannot be fast-forwarded to its remote")]
    NotFastForward { branch: String },

    #[error("Branch {branch} does not exist locally or on the remote")]
    UnknownBranch { branch: String },

    #[error("Working tree has uncommitted changes on branch {branch}")]
    DirtyWorktree { branch: String },

    #[error("Invalid branch name: {0}")]
    InvalidBranchName(String),
}

/// Errors from the repository host.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Repository host request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Repository host returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

/// A unit's recorded offsets do not match the document any more.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("Unit {unit} spans {start}..{end} but the document is only {len} bytes long")]
    OutOfBounds {
        unit: usize,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("Unit {unit} text no longer matches the document at {start}..{end}")]
    Mismatch { unit: usize, start: usize, end: usize },
}

/// Failure of one document's revision workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Correction oracle unavailable: {0}")]
    OracleUnavailable(#[from] OracleError),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] PersistenceError),

    #[error("Repository host error: {0}")]
    Host(#[from] HostError),

    #[error("Document {path} changed underneath the pipeline: {source}")]
    StaleDocument {
        path: PathBuf,
        #[source]
        source: SegmentError,
    },
}

/// Checkpoint, document or version-control failure. Fatal to the current document.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error("Failed to access document {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<CheckpointError> for WorkflowError {
    fn from(err: CheckpointError) -> Self {
        WorkflowError::PersistenceFailure(err.into())
    }
}

impl From<VcsError> for WorkflowError {
    fn from(err: VcsError) -> Self {
        WorkflowError::PersistenceFailure(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_error_converts_to_oracle_unavailable() {
        let err: WorkflowError = OracleError::Truncated.into();
        assert!(matches!(
            err,
            WorkflowError::OracleUnavailable(OracleError::Truncated)
        ));
    }

    #[test]
    fn vcs_error_converts_to_persistence_failure() {
        let err: WorkflowError = VcsError::PushRejected {
            branch: "proofread/a.md".to_string(),
            message: "non-fast-forward".to_string(),
        }
        .into();
        match &err {
            WorkflowError::PersistenceFailure(PersistenceError::Vcs(VcsError::PushRejected {
                branch,
                ..
            })) => assert_eq!(branch, "proofread/a.md"),
            other => panic!("Expected PersistenceFailure(Vcs), got {:?}", other),
        }
        assert!(err.to_string().contains("non-fast-forward"));
    }

    #[test]
    fn checkpoint_error_carries_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: WorkflowError = CheckpointError::Io {
            path: PathBuf::from("story/a.md.metadata"),
            source: io_err,
        }
        .into();
        assert!(err.to_string().contains("story/a.md.metadata"));
    }

    #[test]
    fn segment_error_mentions_unit() {
        let err = SegmentError::Mismatch {
            unit: 3,
            start: 10,
            end: 20,
        };
        assert!(err.to_string().contains("Unit 3"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&OracleError::Truncated);
        assert_std_error(&VcsError::InvalidBranchName("a..b".into()));
        assert_std_error(&HostError::Api {
            status: 422,
            message: "x".into(),
        });
        assert_std_error(&WorkflowError::OracleUnavailable(OracleError::Truncated));
    }
}
