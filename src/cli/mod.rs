//! CLI module for wpaste
//!
//! Provides command-line interface for:
//! - serve: Run the HTTP API with the background reaper
//! - sweep: One-shot deletion of long-expired pastes
//! - compact: One-shot data file compaction

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{compact, run, run_command, serve, sweep, Config};
pub use errors::{CliError, CliErrorCode, CliResult};
