//! Translog CLI
//!
//! Command-line tools for translog domains.
//!
//! # Commands
//!
//! - `inspect` - Display the serial range, size and parts of a domain
//! - `dump` - Replay the entries of a domain through a session
//!
//! Opening a domain performs recovery: empty parts are removed and a torn
//! tail of the last part is truncated.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Translog command-line tools.
#[derive(Parser)]
#[command(name = "translog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base directory holding the domain directories
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
    /// Display domain statistics and parts
    Inspect {
        /// Name of the domain
        domain: String,

        /// Show part details
        #[arg(short = 'P', long)]
        parts: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump log entries for debugging
    Dump {
        /// Name of the domain
        domain: String,

        /// First serial to dump
        #[arg(long, default_value = "0")]
        from: u64,

        /// Dump serials below this one
        #[arg(long)]
        to: Option<u64>,

        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,

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
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect {
            domain,
            parts,
            format,
        } => {
            let path = cli.path.ok_or("Base directory required for inspect")?;
            commands::inspect::run(&path, &domain, parts, &format)?;
        }
        Commands::Dump {
            domain,
            from,
            to,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Base directory required for dump")?;
            let options = commands::dump::DumpOptions {
                from,
                to: to.unwrap_or(u64::MAX),
                limit,
            };
            commands::dump::run(&path, &domain, &options, &format)?;
        }
        Commands::Version => {
            println!("translog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("translog core v{}", translog_core::VERSION);
        }
    }

    Ok(())
}
