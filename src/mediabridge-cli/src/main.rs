use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mediabridge_core::{init_logging, AppDirs, Config};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(name = "mediabridge", version, about = "Media extension bus gateway")]
struct Cli {
    /// Configuration file (defaults to config.toml in the config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate and print the effective configuration
    Config,
    /// Print the directories used for configuration, state and logs
    Paths,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration file {0} does not exist")]
    MissingConfig(PathBuf),
}

fn load_config(explicit: Option<&Path>, dirs: &AppDirs) -> Result<Config> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::MissingConfig(path.to_path_buf()).into());
            }
            Config::load_from(path)
                .with_context(|| format!("loading configuration from {}", path.display()))
        }
        None => Config::load_or_default(dirs).context("loading default configuration"),
    }
}

fn render_config(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).context("serializing configuration")
}

fn render_paths(dirs: &AppDirs, config_file: &Path) -> String {
    [
        format!("config dir: {}", dirs.config_dir().display()),
        format!("config file: {}", config_file.display()),
        format!("state dir: {}", dirs.state_dir().display()),
        format!("log dir: {}", dirs.log_dir().display()),
    ]
    .join("\n")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = AppDirs::discover()?;
    let config = load_config(cli.config.as_deref(), &dirs)?;
    let _logging = init_logging(&config.logging, Some(dirs.log_dir()))?;
    tracing::debug!(config_dir = %dirs.config_dir().display(), "configuration loaded");

    match cli.command {
        Command::Config => print!("{}", render_config(&config)?),
        Command::Paths => {
            let config_file = cli
                .config
                .clone()
                .unwrap_or_else(|| Config::config_path(&dirs));
            println!("{}", render_paths(&dirs, &config_file));
        }
    }

    Ok(())
}
