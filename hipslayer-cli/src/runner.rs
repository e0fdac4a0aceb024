//! CLI runner for common setup and operations.
//!
//! Encapsulates configuration loading, logging initialization, service
//! creation and output files so command handlers stay small.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use hipslayer::config::{config_file_path, ServiceConfig};
use hipslayer::logging::{default_log_dir, default_log_file, init_logging, LoggingGuard};
use hipslayer::service::HipsService;

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    service: Arc<HipsService>,
}

impl CliRunner {
    /// Loads the configuration and builds the service.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Configuration file; `~/.hipslayer/config.ini` when `None`
    /// * `stdout_logging` - Mirror logs to stdout (off while a progress bar is shown)
    pub fn new(config_path: Option<&Path>, stdout_logging: bool) -> Result<Self, CliError> {
        let logging_guard = init_logging(&default_log_dir(), default_log_file(), stdout_logging)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(config_file_path);
        info!(path = %path.display(), "Loading configuration");
        let config = ServiceConfig::load_from(&path)?;
        let service = HipsService::from_config(Arc::new(config))?;

        Ok(Self {
            logging_guard,
            service: Arc::new(service),
        })
    }

    pub fn service(&self) -> &HipsService {
        &self.service
    }

    /// Shared handle for request handlers running on other threads.
    pub fn shared_service(&self) -> Arc<HipsService> {
        self.service.clone()
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("HipsLayer v{}", hipslayer::VERSION);
        info!("HipsLayer CLI: {} command", command);
    }

    /// Write `bytes` to `path`.
    pub fn write_output(&self, path: &Path, bytes: &[u8]) -> Result<(), CliError> {
        std::fs::write(path, bytes).map_err(|error| CliError::FileWrite {
            path: PathBuf::from(path),
            error,
        })?;
        info!(path = %path.display(), size = bytes.len(), "Wrote output file");
        Ok(())
    }
}

/// Worker count used when `--concurrency` is not given.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
