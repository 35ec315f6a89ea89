//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::logging::LoggingError;
use crate::version::VersionError;

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No config file found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Missing logging configuration in {}", .0.display())]
    MissingLogging(PathBuf),
    #[error("{0} environment variable is not defined")]
    MissingEnv(&'static str),
    #[error("failed to create logs directory {}: {source}", path.display())]
    LogsDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error("failed to configure logging: {0}")]
    Logging(#[from] LoggingError),
}
