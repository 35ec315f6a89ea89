//! Application version lookup.
//!
//! A `version/version.txt` file written at packaging time wins. Without it the
//! version comes from `git describe --all --long` run in the project root.

mod error;

pub use error::VersionError;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

use crate::config;

const VERSION_FILE: &str = "version/version.txt";
const DEFAULT_GIT_PROGRAM: &str = "git";
const DESCRIBE_ARGS: [&str; 3] = ["describe", "--all", "--long"];
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolve the version for the default project root.
pub async fn get_version() -> Result<String, VersionError> {
    VersionResolver::new(config::resolve_root())
        .get_version()
        .await
}

/// Resolves the application version from a version file or git.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    version_file: PathBuf,
    work_dir: PathBuf,
    git_program: PathBuf,
    timeout: Duration,
}

impl VersionResolver {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            version_file: root.join(VERSION_FILE),
            work_dir: root.to_path_buf(),
            git_program: PathBuf::from(DEFAULT_GIT_PROGRAM),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_version_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.version_file = path.into();
        self
    }

    pub fn with_git_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.git_program = program.into();
        self
    }

    /// Upper bound on the git subprocess; it is killed when exceeded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn version_file(&self) -> &Path {
        &self.version_file
    }

    /// Version file contents if the file exists, otherwise the first line of
    /// `git describe --all --long`.
    pub async fn get_version(&self) -> Result<String, VersionError> {
        if self.version_file.exists() {
            return tokio::fs::read_to_string(&self.version_file)
                .await
                .map_err(|source| VersionError::ReadFile {
                    path: self.version_file.clone(),
                    source,
                });
        }

        self.call_git(&DESCRIBE_ARGS).await
    }

    async fn call_git(&self, args: &[&str]) -> Result<String, VersionError> {
        let mut command = Command::new(&self.git_program);
        if self.work_dir.is_dir() {
            command.current_dir(&self.work_dir);
        }

        let child = command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    eprintln!(
                        "Can not find Git. Install Git and make sure it is on the PATH (e.g. apt install git)."
                    );
                    VersionError::GitNotFound(e)
                } else {
                    VersionError::Spawn(e)
                }
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| VersionError::Timeout(self.timeout))?
            .map_err(VersionError::Spawn)?;

        if !output.status.success() {
            warn!(
                status = %output.status,
                program = %self.git_program.display(),
                "git describe failed"
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.split('\n').next().unwrap_or_default().to_string())
    }
}
