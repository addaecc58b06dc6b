//! Configuration for the proofreading pipeline.
//!
//! Settings come from `proofreader.toml`, then environment variables, then
//! CLI flags; later layers win. A missing file means defaults.
//!
//! ```toml
//! [model]
//! name = "qwen2.5:32b"
//! context_window = 27192
//! host = "http://localhost:11434"
//! system_prompt_file = "spelling.system"
//!
//! [repository]
//! owner = "someone"
//! name = "stories"
//! base_branch = "main"
//! working_tree = "/data/repo"
//! documents = "story/*"
//!
//! [branch]
//! prefix = "proofread/"
//!
//! [policy]
//! retry_limit = 10
//! acceptance_threshold = 0.8
//!
//! [git]
//! author_name = "Editor"
//! author_email = "no-reply@no.no"
//!
//! [logging]
//! level = "info"
//! json = false
//! directory = "logs"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::host::github::DEFAULT_API_URL;
use crate::policy::{AcceptancePolicy, DEFAULT_ACCEPTANCE_THRESHOLD, DEFAULT_RETRY_LIMIT};
use crate::tracker::Identity;

pub const CONFIG_FILE: &str = "proofreader.toml";

/// Oracle model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default = "default_model")]
    pub name: String,
    /// Passed to the oracle as `num_ctx`.
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    /// Oracle base URL; `OLLAMA_HOST` overrides it.
    #[serde(default)]
    pub host: Option<String>,
    /// File whose content is sent as the system message.
    #[serde(default)]
    pub system_prompt_file: Option<PathBuf>,
}

fn default_model() -> String {
    "qwen2.5:32b".to_string()
}

fn default_context_window() -> u32 {
    27192
}

fn default_host() -> String {
    "http://localhost:11434".to_string()
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            name: default_model(),
            context_window: default_context_window(),
            host: None,
            system_prompt_file: None,
        }
    }
}

/// Repository and working-tree settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySection {
    /// Repository name; derived from the working tree's remote URL if absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Repository owner; defaults to the authenticated user.
    #[serde(default)]
    pub owner: Option<String>,
    /// Base line; defaults to the repository's default branch.
    #[serde(default)]
    pub base_branch: Option<String>,
    #[serde(default = "default_working_tree")]
    pub working_tree: PathBuf,
    /// Glob, relative to the working tree, of documents to process.
    #[serde(default = "default_documents")]
    pub documents: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_working_tree() -> PathBuf {
    PathBuf::from("repo")
}

fn default_documents() -> String {
    "story/*".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for RepositorySection {
    fn default() -> Self {
        Self {
            name: None,
            owner: None,
            base_branch: None,
            working_tree: default_working_tree(),
            documents: default_documents(),
            remote: default_remote(),
            api_url: default_api_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSection {
    #[serde(default = "default_branch_prefix")]
    pub prefix: String,
}

fn default_branch_prefix() -> String {
    "proofread/".to_string()
}

impl Default for BranchSection {
    fn default() -> Self {
        Self {
            prefix: default_branch_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySection {
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
}

fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

fn default_acceptance_threshold() -> f64 {
    DEFAULT_ACCEPTANCE_THRESHOLD
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            retry_limit: default_retry_limit(),
            acceptance_threshold: default_acceptance_threshold(),
        }
    }
}

/// Committer identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSection {
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_author_name() -> String {
    Identity::default().name
}

fn default_author_email() -> String {
    Identity::default().email
}

impl Default for GitSection {
    fn default() -> Self {
        Self {
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

impl GitSection {
    pub fn identity(&self) -> Identity {
        Identity {
            name: self.author_name.clone(),
            email: self.author_email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Directory for a daily-rolling log file, in addition to stderr.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

/// The complete proofreader.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProofreaderToml {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub repository: RepositorySection,
    #[serde(default)]
    pub branch: BranchSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub git: GitSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ProofreaderToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse proofreader.toml")
    }

    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize proofreader.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let threshold = self.policy.acceptance_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            warnings.push(format!(
                "acceptance_threshold {} is outside (0, 1]; it will be clamped",
                threshold
            ));
        }
        if self.policy.retry_limit == 0 {
            warnings.push("retry_limit 0 is treated as 1 attempt per unit".to_string());
        }
        if self.branch.prefix.is_empty() {
            warnings.push("Branch prefix is empty; work branches mix with other branches".to_string());
        } else if !self.branch.prefix.ends_with('/') {
            warnings.push(format!(
                "Branch prefix '{}' does not end with '/'",
                self.branch.prefix
            ));
        }
        if self.model.context_window == 0 {
            warnings.push("context_window 0 leaves the model's own default in place".to_string());
        }
        if let Err(e) = glob::Pattern::new(&self.repository.documents) {
            warnings.push(format!(
                "Invalid documents pattern '{}': {}",
                self.repository.documents, e
            ));
        }

        warnings
    }
}

/// CLI flags that override file and environment settings.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub context_window: Option<u32>,
    pub working_tree: Option<PathBuf>,
    pub branch_prefix: Option<String>,
    pub retry_limit: Option<u32>,
    pub acceptance_threshold: Option<f64>,
}

/// Runtime settings handed to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub model: String,
    pub context_window: u32,
    pub oracle_host: String,
    pub system_prompt: Option<String>,
    pub branch_prefix: String,
    pub working_tree: PathBuf,
    pub retry_limit: u32,
    pub acceptance_threshold: f64,
    /// Base line; replaced by the repository's default branch at startup
    /// when the file does not name one.
    pub base_branch: String,
    /// Documents glob, relative to the working tree.
    pub documents: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            context_window: default_context_window(),
            oracle_host: default_host(),
            system_prompt: None,
            branch_prefix: default_branch_prefix(),
            working_tree: default_working_tree(),
            retry_limit: default_retry_limit(),
            acceptance_threshold: default_acceptance_threshold(),
            base_branch: "main".to_string(),
            documents: default_documents(),
        }
    }
}

impl PipelineConfig {
    /// Layer file → environment → CLI. `env` looks up environment variables;
    /// pass `|k| std::env::var(k).ok()` in production.
    pub fn resolve(
        toml: &ProofreaderToml,
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let system_prompt = match &toml.model.system_prompt_file {
            Some(path) => Some(std::fs::read_to_string(path).with_context(|| {
                format!("Failed to read system prompt file: {}", path.display())
            })?),
            None => None,
        };

        let model = overrides
            .model
            .clone()
            .or_else(|| env("PROOFREADER_MODEL"))
            .unwrap_or_else(|| toml.model.name.clone());
        let oracle_host = env("OLLAMA_HOST")
            .or_else(|| toml.model.host.clone())
            .unwrap_or_else(default_host);

        Ok(Self {
            model,
            context_window: overrides
                .context_window
                .unwrap_or(toml.model.context_window),
            oracle_host,
            system_prompt,
            branch_prefix: overrides
                .branch_prefix
                .clone()
                .unwrap_or_else(|| toml.branch.prefix.clone()),
            working_tree: overrides
                .working_tree
                .clone()
                .unwrap_or_else(|| toml.repository.working_tree.clone()),
            retry_limit: overrides.retry_limit.unwrap_or(toml.policy.retry_limit),
            acceptance_threshold: overrides
                .acceptance_threshold
                .unwrap_or(toml.policy.acceptance_threshold),
            base_branch: toml
                .repository
                .base_branch
                .clone()
                .unwrap_or_else(|| "main".to_string()),
            documents: toml.repository.documents.clone(),
        })
    }

    pub fn policy(&self) -> AcceptancePolicy {
        AcceptancePolicy::new(self.acceptance_threshold, self.retry_limit)
    }

    /// Whether `branch` is one of the pipeline's work branches.
    pub fn is_work_branch(&self, branch: &str) -> bool {
        !self.branch_prefix.is_empty() && branch.starts_with(&self.branch_prefix)
    }
}
