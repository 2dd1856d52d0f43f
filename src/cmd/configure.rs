//! Config file management commands.

use crate::config::ConfigManager;
use crate::error::{Result, Sift365Error};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Path to a sift365.toml overriding the user config
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub fn init(args: InitArgs) -> Result<()> {
    let manager = ConfigManager::new()?;
    let path = manager.init(args.force)?;
    println!(
        "{} Wrote default config to {}",
        "✓".green().bold(),
        path.display().to_string().cyan()
    );
    Ok(())
}

pub fn show(args: ShowArgs) -> Result<()> {
    let manager = ConfigManager::new()?;
    let config = manager.load(args.config.as_deref())?;

    let rendered = toml::to_string_pretty(&config)
        .map_err(|e| Sift365Error::ConfigError(format!("Failed to render config: {}", e)))?;

    println!("{} Effective configuration:\n", "→".cyan());
    println!("{}", rendered);
    Ok(())
}
