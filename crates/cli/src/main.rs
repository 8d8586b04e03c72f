//! Orderflow CLI - migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! orderflow-cli migrate
//!
//! # Validate and publish order documents to the topic
//! orderflow-cli publish order.json
//!
//! # Show what the startup cache warm-up would load
//! orderflow-cli warm-check
//! ```
//!
//! Configuration is read from the same environment variables as the service,
//! after loading `.env` (or the file given with `--env-file`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "orderflow-cli")]
#[command(author, version, about = "Orderflow operator tools")]
struct Cli {
    /// Load environment variables from this file instead of `.env`
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Validate order documents and publish them to the topic
    Publish {
        /// JSON files, one order document each
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the documents a startup warm-up would load
    WarmCheck,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = load_env(cli.env_file.as_deref()) {
        tracing::error!("Failed to load environment file: {e}");
        std::process::exit(1);
    }

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

/// Load an explicit env file, or `.env` from the working directory if present.
///
/// Variables already set in the environment win.
fn load_env(env_file: Option<&Path>) -> Result<(), dotenvy::Error> {
    match env_file {
        Some(path) => dotenvy::from_path(path),
        None => match dotenvy::dotenv() {
            Err(e) if e.not_found() => Ok(()),
            result => result.map(|_| ()),
        },
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Publish { files } => commands::publish::run(&files).await?,
        Commands::WarmCheck => commands::warm_check::run().await?,
    }
    Ok(())
}
