//! Configuration view and validation commands: `proofreader config`.

use anyhow::Result;

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    use proofreader::config::{PipelineConfig, ProofreaderToml};

    let config_path = &cli.config;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Proofreader Configuration");
            println!("=========================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                ProofreaderToml::load(config_path)?
            } else {
                println!("No proofreader.toml found at {}", config_path.display());
                println!("Using default configuration.");
                ProofreaderToml::default()
            };
            println!();

            println!("[model]");
            println!("  name = \"{}\"", toml.model.name);
            println!("  context_window = {}", toml.model.context_window);
            if let Some(host) = &toml.model.host {
                println!("  host = \"{}\"", host);
            }
            if let Some(file) = &toml.model.system_prompt_file {
                println!("  system_prompt_file = \"{}\"", file.display());
            }
            println!();

            println!("[repository]");
            if let Some(owner) = &toml.repository.owner {
                println!("  owner = \"{}\"", owner);
            }
            if let Some(name) = &toml.repository.name {
                println!("  name = \"{}\"", name);
            }
            if let Some(base) = &toml.repository.base_branch {
                println!("  base_branch = \"{}\"", base);
            }
            println!(
                "  working_tree = \"{}\"",
                toml.repository.working_tree.display()
            );
            println!("  documents = \"{}\"", toml.repository.documents);
            println!("  remote = \"{}\"", toml.repository.remote);
            println!();

            println!("[branch]");
            println!("  prefix = \"{}\"", toml.branch.prefix);
            println!();

            println!("[policy]");
            println!("  retry_limit = {}", toml.policy.retry_limit);
            println!(
                "  acceptance_threshold = {}",
                toml.policy.acceptance_threshold
            );
            println!();

            // Effective values (including env overrides)
            println!("Effective values (with env/CLI overrides):");
            let config =
                PipelineConfig::resolve(&toml, &cli.overrides(), |k| std::env::var(k).ok())?;
            println!("  model = \"{}\"", config.model);
            println!("  oracle_host = \"{}\"", config.oracle_host);
            println!("  context_window = {}", config.context_window);
            println!("  working_tree = \"{}\"", config.working_tree.display());
            println!("  branch_prefix = \"{}\"", config.branch_prefix);
            println!("  retry_limit = {}", config.retry_limit);
            println!("  acceptance_threshold = {}", config.acceptance_threshold);
            println!();

            if !config_path.exists() {
                println!("Run 'proofreader config init' to create a proofreader.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No proofreader.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ProofreaderToml::load(config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!(
                    "proofreader.toml already exists at {}",
                    config_path.display()
                );
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent)?;
            }

            ProofreaderToml::default().save(config_path)?;

            println!("Created proofreader.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [model] name, context_window, host, system_prompt_file");
            println!("  - [repository] owner, name, base_branch, working_tree, documents");
            println!("  - [branch] prefix and [policy] retry_limit, acceptance_threshold");
            println!();
        }
    }

    Ok(())
}
