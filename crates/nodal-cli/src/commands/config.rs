//! Show or write the engine configuration.

use std::path::PathBuf;

use clap::Args;
use nodal_config::{EngineConfig, default_config_path};

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the configuration to the user config file
    #[arg(long)]
    write: bool,

    /// Overwrite an existing file when writing
    #[arg(long, requires = "write")]
    force: bool,

    /// Write to this path instead of the user config file
    #[arg(long, requires = "write")]
    output: Option<PathBuf>,
}

pub fn run(
    args: ConfigArgs,
    config: &EngineConfig,
    source: Option<PathBuf>,
) -> anyhow::Result<()> {
    match &source {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# built-in defaults"),
    }
    print!("{}", config.to_toml()?);

    if args.write {
        let path = args.output.unwrap_or_else(default_config_path);
        if path.exists() && !args.force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                path.display()
            );
        }
        config.save(&path)?;
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}
