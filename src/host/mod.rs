//! Repository host seam: pull requests and failure issues.

pub mod github;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::HostError;

pub use github::GitHubHost;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    /// Source branch.
    pub head: String,
    /// Target branch.
    pub base: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub html_url: String,
}

#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Whether any pull request, open or closed, exists with `head` as its
    /// source branch.
    async fn pull_request_exists(&self, head: &str) -> Result<bool, HostError>;

    async fn create_pull_request(&self, request: &NewPullRequest)
    -> Result<PullRequest, HostError>;

    async fn create_issue(&self, title: &str, body: &str) -> Result<Issue, HostError>;
}
