//! Logging backend error types.

use std::path::PathBuf;

/// Logging setup and shipping error.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("handler {name}: unknown handler class '{class}'")]
    UnknownClass { name: String, class: String },
    #[error("handler {handler}: unknown formatter '{formatter}'")]
    UnknownFormatter { handler: String, formatter: String },
    #[error("logger {logger}: unknown handler '{handler}'")]
    UnknownHandler { logger: String, handler: String },
    #[error("invalid format string {format:?}: {reason}")]
    InvalidFormat { format: String, reason: String },
    #[error("handler {0}: {1}")]
    Handler(String, String),
    #[error("failed to open log file {}: {source}", path.display())]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("logstash transport error: {0}")]
    Transport(String),
    #[error("handler {0} needs a running tokio runtime")]
    NoRuntime(String),
    #[error("failed to install global subscriber: {0}")]
    Install(String),
}
