//! Typed view of the `logging` section.
//!
//! The layout follows the usual declarative logging schema: named formatters,
//! named handlers, a root logger and optional per-module loggers.

use serde::Deserialize;
use serde_yaml::Mapping;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::{Environment, duration};
use crate::logging::LogLevel;

/// Logging section of the application config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Schema version, accepted for compatibility.
    pub version: Option<u32>,
    /// Accepted for compatibility; loggers are never disabled.
    #[serde(default)]
    pub disable_existing_loggers: bool,
    #[serde(default)]
    pub formatters: HashMap<String, FormatterConfig>,
    #[serde(default)]
    pub handlers: HashMap<String, HandlerConfig>,
    pub root: Option<LoggerConfig>,
    #[serde(default)]
    pub loggers: HashMap<String, LoggerConfig>,
}

impl LoggingConfig {
    /// Load handler credentials from environment variables.
    pub(crate) fn load_credentials_from_env(&mut self, env: &Environment) {
        for handler in self.handlers.values_mut() {
            if handler.kind() == Some(HandlerKind::Logstash) {
                handler.password = env.logstash_http_pwd.clone();
            }
        }
    }
}

/// A named formatter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatterConfig {
    pub class: Option<String>,
    /// Pattern such as `%(asctime)s - %(name)s - %(levelname)s - %(message)s`.
    pub format: Option<String>,
    /// strftime-style timestamp format used for `%(asctime)s`.
    pub datefmt: Option<String>,
    /// Value of the `type` field in logstash documents.
    pub message_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Static fields added to every logstash document.
    pub extra: Option<Mapping>,
}

impl FormatterConfig {
    pub fn is_logstash(&self) -> bool {
        self.extra.is_some()
            || self
                .class
                .as_deref()
                .is_some_and(|class| class.to_ascii_lowercase().contains("logstash"))
    }
}

/// A named handler.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerConfig {
    /// Handler class, e.g. `logging.StreamHandler` or `logging.FileHandler`.
    pub class: String,
    /// Disabled handlers are skipped entirely.
    #[serde(default = "default_true")]
    pub enable: bool,
    pub level: Option<LogLevel>,
    pub formatter: Option<String>,

    /// Stream target: `ext://sys.stdout` or `ext://sys.stderr`.
    pub stream: Option<String>,

    pub filename: Option<PathBuf>,
    /// `a` appends (default), `w` truncates.
    pub mode: Option<String>,
    #[serde(rename = "maxBytes", default)]
    pub max_bytes: u64,
    #[serde(rename = "backupCount", default)]
    pub backup_count: u32,

    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(default = "default_true")]
    pub ssl_enable: bool,
    pub path: Option<String>,
    pub username: Option<String>,
    /// Password (loaded from LOGSTASH_HTTP_PWD env var).
    #[serde(skip)]
    pub password: Option<String>,
    /// HTTP timeout per batch (default: 5s).
    #[serde(default, with = "duration")]
    pub timeout: Duration,
    pub batch_size: Option<usize>,
    pub queue_size: Option<usize>,
}

impl HandlerConfig {
    pub fn kind(&self) -> Option<HandlerKind> {
        HandlerKind::from_class(&self.class)
    }
}

/// Handler implementations known to the logging backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Stream,
    File,
    RotatingFile,
    Logstash,
}

impl HandlerKind {
    pub fn from_class(class: &str) -> Option<Self> {
        let class = class.to_ascii_lowercase();
        if class.contains("logstash") {
            Some(HandlerKind::Logstash)
        } else if class.contains("rotatingfilehandler") {
            Some(HandlerKind::RotatingFile)
        } else if class.contains("filehandler") {
            Some(HandlerKind::File)
        } else if class.contains("streamhandler") || class == "console" {
            Some(HandlerKind::Stream)
        } else {
            None
        }
    }
}

/// Root or named logger.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    pub level: Option<LogLevel>,
    #[serde(default)]
    pub handlers: Vec<String>,
    #[serde(default = "default_true")]
    pub propagate: bool,
}

fn default_true() -> bool {
    true
}
