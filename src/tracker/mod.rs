//! Version-control seam.
//!
//! The revision workflow only talks to [`VersionControl`]; `GitTracker` is the
//! libgit2-backed implementation. All operations are synchronous and act on
//! the single working tree the pipeline owns.

pub mod git;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::errors::VcsError;

pub use git::{GitTracker, Identity, remote_url};

/// The last commit that touched a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastChange {
    /// Full hex object id.
    pub hash: String,
    pub time: DateTime<Utc>,
}

impl LastChange {
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(7)]
    }
}

pub trait VersionControl: Send {
    /// Update remote-tracking refs.
    fn fetch(&self) -> Result<(), VcsError>;

    /// Check out an existing branch. A branch that only exists on the remote
    /// gets a local branch tracking it.
    fn checkout(&self, branch: &str) -> Result<(), VcsError>;

    /// Create `name` at the current HEAD and switch to it.
    fn checkout_new_branch(&self, name: &str) -> Result<(), VcsError>;

    /// Fast-forward `branch` to its remote counterpart, if there is one.
    fn pull(&self, branch: &str) -> Result<(), VcsError>;

    /// Stage every change in the working tree (including deletions) and
    /// commit. Returns `None` when the tree is unchanged.
    fn commit_all(&self, message: &str) -> Result<Option<String>, VcsError>;

    fn push(&self, branch: &str) -> Result<(), VcsError>;

    /// Newest commit reachable from `rev` that changed `path`.
    fn last_change(&self, rev: &str, path: &Path) -> Result<LastChange, VcsError>;

    /// Whether `name` exists locally or on the remote.
    fn branch_exists(&self, name: &str) -> Result<bool, VcsError>;

    fn current_branch(&self) -> Result<Option<String>, VcsError>;

    /// Repository-relative paths with uncommitted changes, untracked files
    /// included.
    fn dirty_paths(&self) -> Result<Vec<PathBuf>, VcsError>;

    fn is_dirty(&self) -> Result<bool, VcsError> {
        Ok(!self.dirty_paths()?.is_empty())
    }

    /// Force-checkout `branch`, discarding local modifications and removing
    /// untracked files.
    fn reset_to(&self, branch: &str) -> Result<(), VcsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash() {
        let change = LastChange {
            hash: "0123456789abcdef".to_string(),
            time: Utc::now(),
        };
        assert_eq!(change.short_hash(), "0123456");

        let short = LastChange {
            hash: "abc".to_string(),
            time: Utc::now(),
        };
        assert_eq!(short.short_hash(), "abc");
    }
}
