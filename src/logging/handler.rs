//! Handlers: where formatted records end up.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::logstash::{HttpTransport, LogstashShipper, SHIPPER_TARGET};
use super::{Formatter, LogLevel, LogRecord, LoggingError};
use crate::config::{HandlerConfig, HandlerKind};

/// Targets whose records are never shipped, so shipping cannot feed itself.
const UNSHIPPABLE_TARGETS: [&str; 4] = [SHIPPER_TARGET, "reqwest", "hyper", "h2"];

/// Output of a handler.
pub enum Sink {
    Writer(Mutex<Box<dyn Write + Send>>),
    RotatingFile(Mutex<RotatingFile>),
    Logstash(LogstashShipper),
}

/// A level-filtered sink with its formatter.
pub struct Handler {
    name: String,
    level: LogLevel,
    formatter: Arc<Formatter>,
    sink: Sink,
}

impl Handler {
    pub fn new(
        name: impl Into<String>,
        level: LogLevel,
        formatter: Arc<Formatter>,
        sink: Sink,
    ) -> Self {
        Self {
            name: name.into(),
            level,
            formatter,
            sink,
        }
    }

    /// Handler writing formatted lines to `writer`.
    pub fn writer(
        name: impl Into<String>,
        level: LogLevel,
        formatter: Arc<Formatter>,
        writer: impl Write + Send + 'static,
    ) -> Self {
        Self::new(name, level, formatter, Sink::Writer(Mutex::new(Box::new(writer))))
    }

    pub fn from_config(
        name: &str,
        config: &HandlerConfig,
        formatter: Arc<Formatter>,
    ) -> Result<Self, LoggingError> {
        let kind = config.kind().ok_or_else(|| LoggingError::UnknownClass {
            name: name.to_string(),
            class: config.class.clone(),
        })?;
        let level = config.level.unwrap_or(LogLevel::NotSet);

        let sink = match kind {
            HandlerKind::Stream => Sink::Writer(Mutex::new(open_stream(name, config)?)),
            HandlerKind::File => {
                let path = require_filename(name, config)?;
                let truncate = config.mode.as_deref() == Some("w");
                let file = open_file(path, truncate).map_err(|source| LoggingError::OpenFile {
                    path: path.to_path_buf(),
                    source,
                })?;
                Sink::Writer(Mutex::new(Box::new(file)))
            }
            HandlerKind::RotatingFile => {
                let path = require_filename(name, config)?;
                let file = RotatingFile::open(path, config.max_bytes, config.backup_count)
                    .map_err(|source| LoggingError::OpenFile {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Sink::RotatingFile(Mutex::new(file))
            }
            HandlerKind::Logstash => {
                let transport = HttpTransport::from_config(name, config)?;
                Sink::Logstash(LogstashShipper::spawn(
                    name,
                    Arc::new(transport),
                    config.queue_size,
                    config.batch_size,
                )?)
            }
        };

        Ok(Self::new(name, level, formatter, sink))
    }

    /// Emit `record` if it meets the handler level.
    pub fn handle(&self, record: &LogRecord) {
        if record.level < self.level {
            return;
        }

        let result = match &self.sink {
            Sink::Writer(writer) => {
                let line = self.formatter.format(record);
                let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
                writeln!(writer, "{}", line).and_then(|_| writer.flush())
            }
            Sink::RotatingFile(file) => {
                let line = self.formatter.format(record);
                file.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .write_line(&line)
            }
            Sink::Logstash(shipper) => {
                if !is_unshippable(&record.target) {
                    shipper.ship(self.formatter.to_json(record));
                }
                Ok(())
            }
        };

        if let Err(e) = result {
            eprintln!("Failed to write log record to handler {}: {}", self.name, e);
        }
    }

    pub fn flush(&self) {
        let result = match &self.sink {
            Sink::Writer(writer) => writer.lock().unwrap_or_else(PoisonError::into_inner).flush(),
            Sink::RotatingFile(file) => file.lock().unwrap_or_else(PoisonError::into_inner).flush(),
            Sink::Logstash(_) => Ok(()),
        };
        if let Err(e) = result {
            eprintln!("Failed to flush handler {}: {}", self.name, e);
        }
    }

    /// Flush buffered output and release the sink.
    pub async fn close(&self) {
        self.flush();
        if let Sink::Logstash(shipper) = &self.sink {
            shipper.close().await;
        }
    }
}

fn is_unshippable(target: &str) -> bool {
    UNSHIPPABLE_TARGETS.iter().any(|prefix| {
        target == *prefix
            || target
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

fn open_stream(name: &str, config: &HandlerConfig) -> Result<Box<dyn Write + Send>, LoggingError> {
    match config.stream.as_deref() {
        None | Some("ext://sys.stderr") | Some("stderr") => Ok(Box::new(io::stderr())),
        Some("ext://sys.stdout") | Some("stdout") => Ok(Box::new(io::stdout())),
        Some(other) => Err(LoggingError::Handler(
            name.to_string(),
            format!("unsupported stream '{}'", other),
        )),
    }
}

fn require_filename<'a>(name: &str, config: &'a HandlerConfig) -> Result<&'a Path, LoggingError> {
    config
        .filename
        .as_deref()
        .ok_or_else(|| LoggingError::Handler(name.to_string(), "filename is required".into()))
}

fn open_file(path: &Path, truncate: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    options.open(path)
}

/// Size-based rotating log file: `app.log`, `app.log.1` .. `app.log.N`.
///
/// Rotation needs both `max_bytes` and `backup_count` to be non-zero.
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    size: u64,
    max_bytes: u64,
    backup_count: u32,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backup_count: u32) -> io::Result<Self> {
        let path = path.into();
        let file = open_file(&path, false)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            size,
            max_bytes,
            backup_count,
        })
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        let len = line.len() as u64 + 1;
        if self.should_rotate(len) {
            self.rotate()?;
        }
        writeln!(self.file, "{}", line)?;
        self.size += len;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn should_rotate(&self, incoming: u64) -> bool {
        self.max_bytes > 0
            && self.backup_count > 0
            && self.size > 0
            && self.size + incoming > self.max_bytes
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        for index in (1..self.backup_count).rev() {
            let source = self.backup_path(index);
            if source.exists() {
                fs::rename(&source, self.backup_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))?;

        self.file = open_file(&self.path, true)?;
        self.size = 0;
        Ok(())
    }

    fn backup_path(&self, index: u32) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }
}
