use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use proofreader::config::{CONFIG_FILE, Overrides, ProofreaderToml};

mod cmd;

#[derive(Parser)]
#[command(name = "proofreader")]
#[command(
    version,
    about = "Proofread Markdown documents in a git repository, one pull request per document"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Model used for corrections. Overrides PROOFREADER_MODEL and proofreader.toml.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Context window passed to the model
    #[arg(long, global = true)]
    pub context_window: Option<u32>,

    /// Local clone of the repository being proofread
    #[arg(long, global = true)]
    pub working_tree: Option<PathBuf>,

    /// Prefix for revision branch names (e.g. "proofread/")
    #[arg(long, global = true)]
    pub branch_prefix: Option<String>,

    /// Oracle attempts per unit before the original text is kept
    #[arg(long, global = true)]
    pub retry_limit: Option<u32>,

    /// Minimum candidate/original length ratio (0.0-1.0)
    #[arg(long, global = true)]
    pub acceptance_threshold: Option<f64>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            model: self.model.clone(),
            context_window: self.context_window,
            working_tree: self.working_tree.clone(),
            branch_prefix: self.branch_prefix.clone(),
            retry_limit: self.retry_limit,
            acceptance_threshold: self.acceptance_threshold,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Proofread documents and open a pull request for each
    Run {
        /// Documents to process, relative to the working tree. Defaults to
        /// every file matching the configured documents glob.
        documents: Vec<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default proofreader.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let logging = ProofreaderToml::load_or_default(&cli.config)
        .map(|toml| toml.logging)
        .unwrap_or_default();
    let _guard = proofreader::telemetry::init_tracing(
        &logging.level,
        logging.json,
        logging.directory.as_deref(),
    );

    match &cli.command {
        Commands::Run { documents } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if cmd::run::watch_interrupts(tokio::signal::ctrl_c, on_signal).await {
                    std::process::exit(cmd::run::ABORT_EXIT_CODE);
                }
            });
            cmd::cmd_run(&cli, documents, cancel).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
