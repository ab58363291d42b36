mod commands;
mod dry_run;
mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tiller_config::{AppConfig, ConfigLoader, LogConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tiller", version, about = "Apply versioned schema migrations")]
struct Cli {
    /// Config file (.yml, .yaml or .toml). Defaults to ~/.tiller/config.yml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config.
    #[arg(long, env = "TILLER_DATABASE", global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the current and latest schema versions
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Apply pending migrations and print the resulting version
    Migrate {
        /// Stop once the schema reaches this version
        #[arg(long)]
        to: Option<u32>,
        /// Print the statements that would run instead of running them
        #[arg(long)]
        dry_run: bool,
        /// Starting version for a dry run. Defaults to the database's version.
        #[arg(long, requires = "dry_run")]
        from: Option<u32>,
    },
    /// List every registered migration
    List,
    /// Show migrations applied to the database
    History {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(path) = cli.database {
        config.database.path = Some(path);
    }
    init_tracing(&config.log);

    match cli.command {
        Commands::Status { json } => commands::status(&config, json),
        Commands::Migrate { to, dry_run, from } => {
            commands::migrate(&config, to, from, dry_run)
        }
        Commands::List => commands::list(&config),
        Commands::History { json } => commands::history(&config, json),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    match path {
        Some(path) => ConfigLoader::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let dir = tiller_config::loader::default_config_dir();
            ConfigLoader::load_or_default(&dir).context("failed to load config")
        }
    }
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(log: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
