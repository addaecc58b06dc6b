use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::errors::VcsError;
use crate::tracker::LastChange;

// Sequences git refuses inside a ref name (git-check-ref-format). Anything
// else, non-ASCII included, is kept as is.
static REF_FORBIDDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x20\x7f~^:?*\[\\]+|@\{|\.{2,}").unwrap());
static MODEL_RESERVED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[:.]").unwrap());

/// Repository-relative document path with forward slashes, as used in branch
/// names, commit messages and pull-request titles.
pub fn document_label(document: &Path) -> String {
    document
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn sanitize(label: &str) -> String {
    label
        .split('/')
        .map(sanitize_component)
        .collect::<Vec<_>>()
        .join("/")
}

fn sanitize_component(component: &str) -> String {
    let mut safe = REF_FORBIDDEN.replace_all(component, "_").into_owned();
    if safe.starts_with('.') {
        safe.replace_range(..1, "_");
    }
    if let Some(stem) = safe.strip_suffix(".lock") {
        safe = format!("{}_lock", stem);
    }
    if safe.ends_with('.') {
        safe.pop();
        safe.push('_');
    }
    safe
}

/// First eight hex digits of the git blob hash of the raw label. Two paths
/// that sanitize to the same text still get different branches.
fn label_digest(label: &str) -> Result<String, VcsError> {
    let oid = git2::Oid::hash_object(git2::ObjectType::Blob, label.as_bytes())?;
    Ok(oid.to_string()[..8].to_string())
}

/// Binds a document revision and a model to one branch / pull-request
/// lifecycle. Equal inputs always give the same branch name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionIdentity {
    pub document: PathBuf,
    /// Hash of the last commit on the base line that changed the document.
    pub commit: String,
    pub committed_at: DateTime<Utc>,
    pub model: String,
}

impl RevisionIdentity {
    pub fn new(document: &Path, change: &LastChange, model: &str) -> Self {
        Self {
            document: document.to_path_buf(),
            commit: change.hash.clone(),
            committed_at: change.time,
            model: model.to_string(),
        }
    }

    pub fn short_hash(&self) -> &str {
        &self.commit[..self.commit.len().min(7)]
    }

    /// `YYYY-MM-DD` of the revision, UTC.
    pub fn date(&self) -> String {
        self.committed_at.format("%Y-%m-%d").to_string()
    }

    /// `<prefix><document>/<date>/<time>/<model>--<short hash>-<path digest>`
    pub fn branch_name(&self, prefix: &str) -> Result<String, VcsError> {
        let label = document_label(&self.document);
        let model = MODEL_RESERVED.replace_all(&self.model, "_");
        let name = format!(
            "{}{}/{}/{}/{}--{}-{}",
            prefix,
            sanitize(&label),
            self.date(),
            self.committed_at.format("%H-%M-%S"),
            sanitize_component(&model),
            self.short_hash(),
            label_digest(&label)?
        );
        if !git2::Reference::is_valid_name(&format!("refs/heads/{}", name)) {
            return Err(VcsError::InvalidBranchName(name));
        }
        Ok(name)
    }
}
