//! Document pipeline: `proofreader run [DOCUMENTS...]`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::super::Cli;

const TOKEN_VAR: &str = "GITHUB_API_TOKEN";

/// Exit status after a second interrupt (128 + SIGINT).
pub const ABORT_EXIT_CODE: i32 = 130;

/// The first interrupt cancels `cancel` so the run stops after the current
/// unit. Returns `true` on a second interrupt, when the caller should exit
/// without waiting for the unit in flight. Returns `false` if the signal
/// source fails.
pub async fn watch_interrupts<F, Fut>(mut interrupt: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    tracing::warn!("interrupt received, stopping after the current unit (interrupt again to abort)");
    cancel.cancel();

    if interrupt().await.is_err() {
        return false;
    }
    tracing::error!("second interrupt received, aborting");
    true
}

pub async fn cmd_run(cli: &Cli, documents: &[PathBuf], cancel: CancellationToken) -> Result<()> {
    use proofreader::config::{PipelineConfig, ProofreaderToml};
    use proofreader::host::GitHubHost;
    use proofreader::host::github::{is_valid_github_token, parse_owner_repo_from_url};
    use proofreader::oracle::OllamaClient;
    use proofreader::orchestrator::{Orchestrator, WorktreeLock, relative_document};
    use proofreader::tracker::{GitTracker, remote_url};

    let toml = ProofreaderToml::load_or_default(&cli.config)?;
    for warning in toml.validate() {
        tracing::warn!(warning = %warning, "configuration warning");
    }
    let mut config =
        PipelineConfig::resolve(&toml, &cli.overrides(), |k| std::env::var(k).ok())?;

    let token = std::env::var(TOKEN_VAR)
        .with_context(|| format!("{} is not set (environment or .env file)", TOKEN_VAR))?;
    if !is_valid_github_token(&token) {
        tracing::warn!("{} does not look like a GitHub token", TOKEN_VAR);
    }

    // Owner and name: file first, then the existing clone's remote, then the
    // token's user for the owner.
    let from_remote = remote_url(&config.working_tree, &toml.repository.remote)
        .and_then(|url| parse_owner_repo_from_url(&url));
    let owner = match toml
        .repository
        .owner
        .clone()
        .or_else(|| from_remote.as_ref().map(|(o, _)| o.clone()))
    {
        Some(owner) => owner,
        None => GitHubHost::new(&toml.repository.api_url, token.clone(), "", "")
            .authenticated_user()
            .await
            .context("Failed to look up the token's user")?,
    };
    let name = toml
        .repository
        .name
        .clone()
        .or_else(|| from_remote.map(|(_, r)| r))
        .context("Repository name unknown: set [repository] name in proofreader.toml")?;

    let host = GitHubHost::new(&toml.repository.api_url, token.clone(), owner, name);
    let repository = host
        .repository()
        .await
        .with_context(|| format!("Failed to fetch repository {}", host.slug()))?;
    if toml.repository.base_branch.is_none() {
        config.base_branch = repository.default_branch.clone();
    }
    tracing::info!(
        repository = %repository.full_name,
        base = %config.base_branch,
        "repository resolved"
    );

    let _lock = WorktreeLock::acquire(&config.working_tree)?;
    let tracker = GitTracker::open_or_clone(
        &repository.clone_url,
        &config.working_tree,
        &toml.repository.remote,
        toml.git.identity(),
        Some(token),
    )
    .with_context(|| {
        format!(
            "Failed to open working tree {}",
            config.working_tree.display()
        )
    })?;

    let mut oracle = OllamaClient::new(&config.oracle_host, &config.model, config.context_window)?;
    if let Some(prompt) = &config.system_prompt {
        oracle = oracle.with_system_prompt(prompt.clone());
    }
    oracle
        .ensure_model()
        .await
        .with_context(|| format!("Oracle at {} is not ready", config.oracle_host))?;

    let working_tree = config.working_tree.clone();
    let orchestrator = Orchestrator::new(
        config,
        Box::new(tracker),
        Arc::new(oracle),
        Arc::new(host),
    )
    .with_cancellation(cancel);
    orchestrator.prepare()?;

    let documents = if documents.is_empty() {
        orchestrator.discover_documents()?
    } else {
        documents
            .iter()
            .map(|d| {
                relative_document(&working_tree, d).with_context(|| {
                    format!(
                        "{} is outside the working tree {}",
                        d.display(),
                        working_tree.display()
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?
    };

    if documents.is_empty() {
        println!("No documents match {}.", orchestrator.config().documents);
        return Ok(());
    }

    let report = orchestrator.run(&documents).await;
    println!();
    print!("{}", report);

    let failed = report.failures();
    if failed > 0 {
        tracing::warn!(failed, total = documents.len(), "some documents failed");
    }
    Ok(())
}
