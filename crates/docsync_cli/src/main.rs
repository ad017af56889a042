//! docsync CLI
//!
//! Command-line tools for inspecting docsync state stores.
//!
//! # Commands
//!
//! - `init` - Create an empty state store
//! - `status` - Show tracked documents and lifecycle counts
//! - `stuck` - List documents stuck mid-protocol, oldest first
//! - `orphans` - List orphaned remote versions awaiting deletion

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// docsync command-line state store tools.
#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the state store directory
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
    /// Create an empty state store
    Init,

    /// Show tracked documents and lifecycle counts
    Status {
        /// Show every document record, not just the counts
        #[arg(short, long)]
        all: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List documents stuck mid-protocol, oldest first
    Stuck {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List orphaned remote versions awaiting deletion
    Orphans {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
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
        Commands::Init => {
            let path = cli.path.ok_or("Store path required for init")?;
            commands::init::run(&path)?;
        }
        Commands::Status { all, format } => {
            let path = cli.path.ok_or("Store path required for status")?;
            commands::status::run(&path, all, &format)?;
        }
        Commands::Stuck { format } => {
            let path = cli.path.ok_or("Store path required for stuck")?;
            commands::stuck::run(&path, &format)?;
        }
        Commands::Orphans { format } => {
            let path = cli.path.ok_or("Store path required for orphans")?;
            commands::orphans::run(&path, &format)?;
        }
        Commands::Version => {
            println!("docsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
