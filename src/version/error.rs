//! Version resolution error types.

use std::path::PathBuf;
use std::time::Duration;

/// Version resolution error.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("failed to read version file {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("git executable not found: {0}")]
    GitNotFound(#[source] std::io::Error),
    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("git describe did not finish within {0:?}")]
    Timeout(Duration),
}
