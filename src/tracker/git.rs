use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Cred, FetchOptions, IndexAddOption, PushOptions, RemoteCallbacks, Repository,
    Signature, Sort, StatusOptions,
};

use super::{LastChange, VersionControl};
use crate::errors::VcsError;

/// Committer identity used for every pipeline commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "Editor".to_string(),
            email: "no-reply@no.no".to_string(),
        }
    }
}

pub struct GitTracker {
    repo: Repository,
    remote: String,
    identity: Identity,
    token: Option<String>,
}

impl GitTracker {
    pub fn open(working_tree: &Path, remote: &str, identity: Identity) -> Result<Self, VcsError> {
        let repo = Repository::open(working_tree)?;
        Ok(Self {
            repo,
            remote: remote.to_string(),
            identity,
            token: None,
        })
    }

    /// Open `working_tree`, cloning `url` into it first when it is not a
    /// repository yet.
    pub fn open_or_clone(
        url: &str,
        working_tree: &Path,
        remote: &str,
        identity: Identity,
        token: Option<String>,
    ) -> Result<Self, VcsError> {
        let repo = if working_tree.join(".git").exists() {
            Repository::open(working_tree)?
        } else {
            tracing::info!(url = %url, path = %working_tree.display(), "cloning repository");
            let mut fetch = FetchOptions::new();
            fetch.remote_callbacks(credential_callbacks(token.clone()));
            RepoBuilder::new()
                .fetch_options(fetch)
                .clone(url, working_tree)?
        };

        Ok(Self {
            repo,
            remote: remote.to_string(),
            identity,
            token,
        })
    }

    pub fn workdir(&self) -> Option<PathBuf> {
        self.repo.workdir().map(Path::to_path_buf)
    }

    /// Get the HEAD commit if it exists (returns None for unborn branches)
    fn head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }

    fn remote_ref(&self, branch: &str) -> String {
        format!("refs/remotes/{}/{}", self.remote, branch)
    }

    fn switch_to(&self, refname: &str, force: bool) -> Result<(), VcsError> {
        let target = self.repo.revparse_single(refname)?;
        let mut checkout = CheckoutBuilder::new();
        if force {
            checkout.force().remove_untracked(true);
        } else {
            checkout.safe();
        }
        self.repo.checkout_tree(&target, Some(&mut checkout))?;
        self.repo.set_head(refname)?;
        Ok(())
    }
}

fn credential_callbacks<'a>(token: Option<String>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username, _allowed| match &token {
        Some(token) => Cred::userpass_plaintext("x-access-token", token),
        None => Cred::default().or_else(|_| Cred::username(username.unwrap_or("git"))),
    });
    callbacks
}

fn tree_entry(tree: &git2::Tree<'_>, path: &Path) -> Option<git2::Oid> {
    tree.get_path(path).ok().map(|entry| entry.id())
}

/// URL of `remote` in an existing working tree, if there is one.
pub fn remote_url(working_tree: &Path, remote: &str) -> Option<String> {
    let repo = Repository::open(working_tree).ok()?;
    let remote = repo.find_remote(remote).ok()?;
    remote.url().map(str::to_string)
}

impl VersionControl for GitTracker {
    fn fetch(&self) -> Result<(), VcsError> {
        let mut remote = self.repo.find_remote(&self.remote)?;
        let mut options = FetchOptions::new();
        options.remote_callbacks(credential_callbacks(self.token.clone()));
        remote.fetch::<&str>(&[], Some(&mut options), None)?;
        Ok(())
    }

    fn checkout(&self, branch: &str) -> Result<(), VcsError> {
        let local = format!("refs/heads/{}", branch);
        if self.repo.find_branch(branch, BranchType::Local).is_err() {
            let remote_ref = self.remote_ref(branch);
            let commit = self
                .repo
                .find_reference(&remote_ref)
                .and_then(|r| r.peel_to_commit())
                .map_err(|_| VcsError::UnknownBranch {
                    branch: branch.to_string(),
                })?;
            let mut created = self.repo.branch(branch, &commit, false)?;
            created.set_upstream(Some(&format!("{}/{}", self.remote, branch)))?;
        }
        self.switch_to(&local, false)?;
        tracing::debug!(branch, "checked out");
        Ok(())
    }

    fn checkout_new_branch(&self, name: &str) -> Result<(), VcsError> {
        if !git2::Branch::name_is_valid(name)? {
            return Err(VcsError::InvalidBranchName(name.to_string()));
        }
        let head = self.head_commit().ok_or_else(|| VcsError::UnknownBranch {
            branch: "HEAD".to_string(),
        })?;
        self.repo.branch(name, &head, false)?;
        self.repo.set_head(&format!("refs/heads/{}", name))?;
        tracing::info!(branch = name, "created branch");
        Ok(())
    }

    fn pull(&self, branch: &str) -> Result<(), VcsError> {
        let Ok(remote_ref) = self.repo.find_reference(&self.remote_ref(branch)) else {
            return Ok(());
        };
        let incoming = self.repo.reference_to_annotated_commit(&remote_ref)?;
        let (analysis, _) = self.repo.merge_analysis(&[&incoming])?;

        if analysis.is_up_to_date() {
            return Ok(());
        }
        if !analysis.is_fast_forward() {
            return Err(VcsError::NotFastForward {
                branch: branch.to_string(),
            });
        }

        let local = format!("refs/heads/{}", branch);
        let mut reference = self.repo.find_reference(&local)?;
        reference.set_target(incoming.id(), "fast-forward")?;
        self.repo.set_head(&local)?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))?;
        tracing::debug!(branch, "fast-forwarded");
        Ok(())
    }

    fn commit_all(&self, message: &str) -> Result<Option<String>, VcsError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let parent = self.head_commit();
        if let Some(parent) = &parent
            && parent.tree_id() == tree_id
        {
            return Ok(None);
        }

        let tree = self.repo.find_tree(tree_id)?;
        let sig = Signature::now(&self.identity.name, &self.identity.email)?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        Ok(Some(oid.to_string()))
    }

    fn push(&self, branch: &str) -> Result<(), VcsError> {
        let mut remote = self.repo.find_remote(&self.remote)?;
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
        let mut rejection: Option<String> = None;
        {
            let mut callbacks = credential_callbacks(self.token.clone());
            callbacks.push_update_reference(|_refname, status| {
                if let Some(message) = status {
                    rejection = Some(message.to_string());
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(|e| VcsError::PushRejected {
                    branch: branch.to_string(),
                    message: e.message().to_string(),
                })?;
        }
        if let Some(message) = rejection {
            return Err(VcsError::PushRejected {
                branch: branch.to_string(),
                message,
            });
        }
        tracing::debug!(branch, remote = %self.remote, "pushed");
        Ok(())
    }

    fn last_change(&self, rev: &str, path: &Path) -> Result<LastChange, VcsError> {
        let no_history = || VcsError::NoHistory {
            path: path.to_path_buf(),
            reference: rev.to_string(),
        };
        let start = self
            .repo
            .revparse_single(rev)
            .and_then(|o| o.peel_to_commit())
            .map_err(|_| no_history())?;
        if tree_entry(&start.tree()?, path).is_none() {
            return Err(no_history());
        }

        let mut walk = self.repo.revwalk()?;
        walk.push(start.id())?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        for oid in walk {
            let commit = self.repo.find_commit(oid?)?;
            let Some(entry) = tree_entry(&commit.tree()?, path) else {
                continue;
            };
            let changed = commit.parents().all(|parent| {
                parent
                    .tree()
                    .ok()
                    .and_then(|tree| tree_entry(&tree, path))
                    != Some(entry)
            });
            if changed {
                let time: DateTime<Utc> =
                    DateTime::from_timestamp(commit.author().when().seconds(), 0)
                        .unwrap_or_default();
                return Ok(LastChange {
                    hash: commit.id().to_string(),
                    time,
                });
            }
        }
        Err(no_history())
    }

    fn branch_exists(&self, name: &str) -> Result<bool, VcsError> {
        if self.repo.find_branch(name, BranchType::Local).is_ok() {
            return Ok(true);
        }
        Ok(self.repo.find_reference(&self.remote_ref(name)).is_ok())
    }

    fn current_branch(&self) -> Result<Option<String>, VcsError> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn dirty_paths(&self) -> Result<Vec<PathBuf>, VcsError> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut options))?;
        Ok(statuses
            .iter()
            .filter_map(|entry| entry.path().map(PathBuf::from))
            .collect())
    }

    fn reset_to(&self, branch: &str) -> Result<(), VcsError> {
        tracing::warn!(branch, "discarding working tree changes");
        self.switch_to(&format!("refs/heads/{}", branch), true)
    }
}
