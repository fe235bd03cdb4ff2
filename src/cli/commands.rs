//! CLI command implementations
//!
//! `serve` opens the data file, starts the reaper and serves HTTP until
//! Ctrl-C. `sweep` and `compact` are one-shot maintenance commands on the
//! same data file.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::http_server::{HttpServer, HttpServerConfig};
use crate::paste::{PasteService, Reaper, ReaperConfig, DEFAULT_NAME_LENGTH};
use crate::storage::{Store, DEFAULT_MAX_COMMIT_FRAME};

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Data file (default "data.db")
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Log file, appended to; logs go to stderr when unset
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Seconds between reaper sweeps (default 1h)
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// Seconds an expired paste is kept before deletion (default 4h)
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Length of generated names (default 3)
    #[serde(default = "default_name_length")]
    pub name_length: usize,

    /// Bind address, body limits and help document
    #[serde(flatten)]
    pub http: HttpServerConfig,
}

fn default_data_file() -> PathBuf {
    PathBuf::from("data.db")
}
fn default_reap_interval_secs() -> u64 {
    60 * 60
}
fn default_grace_period_secs() -> u64 {
    4 * 60 * 60
}
fn default_name_length() -> usize {
    DEFAULT_NAME_LENGTH
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            log_file: None,
            reap_interval_secs: default_reap_interval_secs(),
            grace_period_secs: default_grace_period_secs(),
            name_length: default_name_length(),
            http: HttpServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> CliResult<()> {
        if self.reap_interval_secs == 0 {
            return Err(CliError::config_error("reap_interval_secs must be > 0"));
        }

        if self.name_length == 0 {
            return Err(CliError::config_error("name_length must be > 0"));
        }

        if self.http.max_upload_bytes == 0 {
            return Err(CliError::config_error("max_upload_bytes must be > 0"));
        }

        if self.http.max_edit_bytes == 0 {
            return Err(CliError::config_error("max_edit_bytes must be > 0"));
        }

        Ok(())
    }

    /// Largest frame one commit can write under the configured body limits.
    /// JSON escaping grows a payload at most six times.
    pub fn max_commit_frame(&self) -> u64 {
        let body = self.http.max_upload_bytes.max(self.http.max_edit_bytes) as u64;
        body.saturating_mul(6)
            .saturating_add(1 << 20)
            .max(DEFAULT_MAX_COMMIT_FRAME)
    }

    /// Open the configured data file.
    pub fn open_store(&self) -> CliResult<Store> {
        Ok(Store::open_with_commit_limit(
            &self.data_file,
            self.max_commit_frame(),
        )?)
    }

    pub fn reaper_config(&self) -> ReaperConfig {
        ReaperConfig {
            interval: Duration::from_secs(self.reap_interval_secs),
            grace: Duration::from_secs(self.grace_period_secs),
        }
    }
}

/// Main entry point for CLI
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(config.as_deref(), port),
        Command::Sweep { config } => sweep(config.as_deref()).map(|deleted| {
            println!("{} expired pastes deleted", deleted);
        }),
        Command::Compact { config } => compact(config.as_deref()).map(|reclaimed| {
            println!("{} bytes reclaimed", reclaimed);
        }),
    }
}

/// Serve the HTTP API until Ctrl-C.
pub fn serve(config_path: Option<&Path>, port: Option<u16>) -> CliResult<()> {
    let mut config = Config::load_or_default(config_path)?;
    if let Some(port) = port {
        config.http.port = port;
    }

    init_logging(config.log_file.as_deref())?;

    let store = Arc::new(config.open_store()?);
    let service = PasteService::new(Arc::clone(&store)).with_name_length(config.name_length);
    let reaper = Reaper::new(store, config.reaper_config());
    let server = HttpServer::new(config.http.clone(), service);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::serve_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        let (stop_tx, stop_rx) = watch::channel(false);
        let reaper_handle = reaper.spawn(stop_rx);

        let result = server.start(shutdown_signal()).await;

        if stop_tx.send(true).is_err() {
            warn!("reaper already stopped");
        }
        if let Err(e) = reaper_handle.await {
            error!(error = %e, "reaper task failed");
        }

        result.map_err(|e| CliError::serve_failed(format!("HTTP server failed: {}", e)))
    })
}

/// Run one reaper sweep and return the number of deleted pastes.
pub fn sweep(config_path: Option<&Path>) -> CliResult<usize> {
    let config = Config::load_or_default(config_path)?;
    init_logging(config.log_file.as_deref())?;

    let store = Arc::new(config.open_store()?);
    let deleted = Reaper::new(store, config.reaper_config()).sweep()?;
    Ok(deleted)
}

/// Compact the data file and return the number of bytes reclaimed.
pub fn compact(config_path: Option<&Path>) -> CliResult<u64> {
    let config = Config::load_or_default(config_path)?;
    init_logging(config.log_file.as_deref())?;

    let store = config.open_store()?;
    let reclaimed = store.compact()?;
    info!(reclaimed, path = %config.data_file.display(), "data file compacted");
    Ok(reclaimed)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` selects levels (default `info`). With `log_file` set, output is
/// appended there without ANSI colors. A subscriber that is already installed
/// is kept.
fn init_logging(log_file: Option<&Path>) -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (writer, ansi) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    CliError::io_error(format!(
                        "Failed to open log file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_writer(writer)
        .try_init();

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            error!(error = %e, "failed to listen for Ctrl-C, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
