//! Output configuration file management.

use super::common::load_default;
use cascada_config::{OutputConfig, default_config_path};
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print a configuration (the default file when no path is given)
    Show {
        /// Configuration file to print
        path: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Destination (defaults to the user config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the default configuration file location
    Path,
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command.unwrap_or(ConfigCommand::Show { path: None }) {
        ConfigCommand::Show { path } => {
            let config = match path {
                Some(path) => OutputConfig::load(path)?,
                None => load_default()?,
            };
            print!("{}", config.to_toml()?);
        }
        ConfigCommand::Init { path, force } => {
            let path = path.unwrap_or_else(default_config_path);
            if path.exists() && !force {
                anyhow::bail!(
                    "'{}' already exists (use --force to overwrite)",
                    path.display()
                );
            }
            OutputConfig::default().save(&path)?;
            println!("Wrote {}", path.display());
        }
        ConfigCommand::Path => println!("{}", default_config_path().display()),
    }
    Ok(())
}
