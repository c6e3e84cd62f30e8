//! Nodal CLI - drive the nodal engine from request scripts.

mod commands;
mod output;
mod script;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nodal_config::{EngineConfig, find_config};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nodal")]
#[command(author, version, about = "Command-line host for the nodal engine", long_about = None)]
struct Cli {
    /// Engine configuration file (defaults to ./nodal.toml, then the user config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a request script and print responses and notifications as JSON lines
    Run(commands::run::RunArgs),

    /// Print the effective engine configuration
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config
        && !path.is_file()
    {
        anyhow::bail!("config file {} not found", path.display());
    }
    let source = find_config(cli.config.as_deref());
    let config = match &source {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .init();
    if let Some(path) = &source {
        tracing::debug!("config: loaded {}", path.display());
    }

    match cli.command {
        Commands::Run(args) => commands::run::run(args, config),
        Commands::Config(args) => commands::config::run(args, &config, source),
    }
}
