//! Logging setup for the CLI and the tile server.
//!
//! - Writes to `<log_dir>/hipslayer.log`, cleared at startup
//! - Optionally mirrors to stdout
//! - Level from `RUST_LOG`, `info` otherwise

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::default_cache_dir;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard flushes and closes the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Installs the global subscriber.
///
/// # Arguments
///
/// * `log_dir` - Directory for the log file, created if needed
/// * `log_file` - Log file name; any previous content is discarded
/// * `stdout` - Whether to also log to stdout
///
/// # Errors
///
/// Fails if the log file cannot be prepared or a subscriber is already set.
pub fn init_logging(log_dir: &Path, log_file: &str, stdout: bool) -> Result<LoggingGuard, io::Error> {
    prepare_log_file(log_dir, log_file)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    let stdout_layer = stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stdout)
            .with_ansi(true)
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Creates `log_dir` and truncates `log_file` inside it.
fn prepare_log_file(log_dir: &Path, log_file: &str) -> Result<PathBuf, io::Error> {
    fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(log_file);
    fs::write(&log_path, "")?;
    Ok(log_path)
}

pub fn default_log_dir() -> PathBuf {
    default_cache_dir().join("logs")
}

pub fn default_log_file() -> &'static str {
    "hipslayer.log"
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_paths() {
        assert!(default_log_dir().ends_with("hipslayer/logs"));
        assert_eq!(default_log_file(), "hipslayer.log");
    }

    #[test]
    fn test_prepare_creates_directory_and_clears_file() {
        let temp = TempDir::new().unwrap();
        let log_dir = temp.path().join("nested").join("logs");

        let path = prepare_log_file(&log_dir, "test.log").unwrap();
        assert!(path.exists());

        fs::write(&path, "old log data").unwrap();
        prepare_log_file(&log_dir, "test.log").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
