//! CLI argument definitions using clap
//!
//! Commands:
//! - wpaste serve [--config <path>] [--port <port>]
//! - wpaste sweep [--config <path>]
//! - wpaste compact [--config <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// wpaste - Easy code sharing over plain HTTP
#[derive(Parser, Debug)]
#[command(name = "wpaste")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API and run the background reaper
    Serve {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on, overriding the configuration file
        #[arg(long)]
        port: Option<u16>,
    },

    /// Delete long-expired pastes once and exit
    Sweep {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Rewrite the data file without superseded and deleted entries
    Compact {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
