//! DMCI Ingest - command-line driver for single jobs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dmci_common::logging::{init_logging, LogConfig, LogLevel};
use dmci_ingest::{Config, Ingest, IngestResult};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "dmci-ingest")]
#[command(author, version, about = "Validate and distribute MMD metadata records")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to $DMCI_CONFIG, then config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert a new record
    Insert {
        /// MMD XML file
        file: PathBuf,
    },

    /// Replace an existing record
    Update {
        /// MMD XML file
        file: PathBuf,
    },

    /// Delete a record from every backend
    Delete {
        /// Record identifier, `namespace:UUID`
        identifier: String,
    },

    /// Validate and transform a record without distributing it
    Validate {
        /// MMD XML file
        file: PathBuf,
    },
}

/// Exit code for an HTTP-style status
fn exit_code(status: u16) -> ExitCode {
    match status {
        200..=299 => ExitCode::SUCCESS,
        400..=499 => ExitCode::from(2),
        507 => ExitCode::from(3),
        _ => ExitCode::FAILURE,
    }
}

async fn run_job(ingest: &Ingest, command: Command) -> Result<IngestResult<String>> {
    let read = |file: &PathBuf| {
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))
    };

    Ok(match command {
        Command::Insert { file } => ingest.insert(&read(&file)?).await,
        Command::Update { file } => ingest.update(&read(&file)?).await,
        Command::Validate { file } => ingest.validate(&read(&file)?).await,
        Command::Delete { identifier } => ingest.delete(&identifier).await,
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("dmci-ingest")
        .build()
        .merge_env()?;

    init_logging(&log_config)?;

    let config = Config::load(cli.config.as_deref()).context("Invalid configuration")?;
    let ingest = Ingest::from_config(&config).context("Failed to set up backends")?;

    match run_job(&ingest, cli.command).await? {
        Ok(message) => {
            info!("Job finished");
            println!("{}", message);
            Ok(exit_code(dmci_ingest::app::STATUS_OK))
        },
        Err(e) => {
            let status = e.status_code();
            error!(status, error = %e, "Job failed");
            eprintln!("{}", e);
            Ok(exit_code(status))
        },
    }
}
