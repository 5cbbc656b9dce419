//! # Lumen CLI
//!
//! Command-line driver for the Lumen index registry.
//!
//! ## Commands
//!
//! - `lumen soak` - Hammer a registry with concurrent writers, readers and
//!   reopens, then check that every snapshot was returned and released
//! - `lumen config show` - Print the effective configuration
//! - `lumen config init` - Write a default configuration file
//! - `lumen config path` - Print where the configuration file is read from
//!
//! ## Example Usage
//!
//! ```bash
//! # Ten seconds against three indexes with snapshot readers
//! lumen soak -i docs -i logs -i users --duration 10 --mode snapshot
//!
//! # Machine-readable report
//! lumen soak --output json
//! ```

mod app;
mod commands;

use clap::{Parser, Subcommand};
use lumen_core::ReaderMode;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Lumen - writer and reader lifecycle for named search indexes
#[derive(Parser)]
#[command(name = "lumen")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "LUMEN_CONFIG")]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run concurrent writers, readers and reopens against a registry
    Soak {
        /// Index names to exercise (can be used multiple times)
        #[arg(short, long = "index", default_value = "docs")]
        indexes: Vec<String>,

        /// Writer threads per index
        #[arg(short, long, default_value = "2")]
        writers: usize,

        /// Reader threads per index
        #[arg(short, long, default_value = "4")]
        readers: usize,

        /// How long to run, in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Pause between reopen passes, in milliseconds
        #[arg(long, default_value = "20")]
        reopen_ms: u64,

        /// Commit after this many documents per writer thread
        #[arg(long, default_value = "50")]
        commit_every: usize,

        /// Override the configured reader mode (realtime, snapshot)
        #[arg(short, long)]
        mode: Option<ReaderMode>,

        /// Override the configured base directory (default: a scratch
        /// directory removed after the run)
        #[arg(short, long)]
        base_dir: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the configuration file path
    Path,
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => lumen_core::LumenConfig::default_config_path()?,
    };

    match cli.command {
        Commands::Soak {
            indexes,
            writers,
            readers,
            duration,
            reopen_ms,
            commit_every,
            mode,
            base_dir,
            output,
        } => {
            let mut config = lumen_core::LumenConfig::load_from(&config_path)?;
            if let Some(mode) = mode {
                config.readers.mode = mode;
            }
            if base_dir.is_some() {
                config.storage.base_dir = base_dir;
            }

            let options = commands::soak::SoakOptions {
                indexes,
                writers,
                readers,
                duration: std::time::Duration::from_secs(duration),
                reopen_interval: std::time::Duration::from_millis(reopen_ms),
                commit_every,
            };
            commands::soak::run(config, options, output)
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&config_path),
            ConfigAction::Init { force } => commands::config::init(&config_path, force),
            ConfigAction::Path => commands::config::path(&config_path),
        },
    }
}
