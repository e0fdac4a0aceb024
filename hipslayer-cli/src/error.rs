//! CLI error handling with user-friendly messages.
//!
//! Every command returns [`CliError`]; `main` prints it and exits with
//! status 1.

use std::fmt;
use std::path::PathBuf;
use std::process;

use hipslayer::codec::CodecError;
use hipslayer::config::ConfigError;
use hipslayer::mosaic::MosaicError;
use hipslayer::provider::RenderError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration could not be loaded or is invalid
    Config(ConfigError),
    /// A command-line value could not be interpreted
    InvalidArgument(String),
    /// The service answered a request with an error status
    Request { path: String, status: u16, message: String },
    /// Seeding or Allsky generation aborted
    Mosaic(MosaicError),
    /// A planar render failed
    Render(RenderError),
    /// Encoding the output image failed
    Encode(CodecError),
    /// Failed to write output file
    FileWrite { path: PathBuf, error: std::io::Error },
    /// Tile server error
    Serve(std::io::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Config(ConfigError::NotFound(_)) = self {
            eprintln!();
            eprintln!("Create the file or point to one with --config <FILE>.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Request {
                path,
                status,
                message,
            } => write!(f, "Request {} failed with status {}: {}", path, status, message),
            CliError::Mosaic(e) => write!(f, "{}", e),
            CliError::Render(e) => write!(f, "Failed to render map: {}", e),
            CliError::Encode(e) => write!(f, "Failed to encode image: {}", e),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path.display(), error)
            }
            CliError::Serve(e) => write!(f, "Tile server error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Mosaic(e) => Some(e),
            CliError::Render(e) => Some(e),
            CliError::Encode(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            CliError::Serve(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<MosaicError> for CliError {
    fn from(e: MosaicError) -> Self {
        CliError::Mosaic(e)
    }
}

impl From<RenderError> for CliError {
    fn from(e: RenderError) -> Self {
        CliError::Render(e)
    }
}

impl From<CodecError> for CliError {
    fn from(e: CodecError) -> Self {
        CliError::Encode(e)
    }
}
