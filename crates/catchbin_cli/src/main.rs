//! catchbin CLI
//!
//! Command-line tools for the catchbin local store.
//!
//! # Commands
//!
//! - `inspect` - Display store statistics
//! - `sessions` - List cached sessions
//! - `requests` - List the cached requests of a session
//! - `compact` - Rewrite the log to reclaim space

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// catchbin local store tools.
#[derive(Parser)]
#[command(name = "catchbin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List cached sessions, oldest first
    Sessions,

    /// List the cached requests of a session, newest first
    Requests {
        /// Session id
        session_id: String,
    },

    /// Rewrite the log as a single snapshot
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Sessions => {
            let path = cli.path.ok_or("Store path required for sessions")?;
            commands::sessions::run(&path)?;
        }
        Commands::Requests { session_id } => {
            let path = cli.path.ok_or("Store path required for requests")?;
            commands::requests::run(&path, &session_id)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("catchbin CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Store format v{} ({})",
                catchbin_storage::LOG_VERSION,
                String::from_utf8_lossy(&catchbin_storage::LOG_MAGIC)
            );
        }
    }

    Ok(())
}
