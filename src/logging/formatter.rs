//! Record formatters: printf-style patterns and logstash JSON documents.

use chrono::format::{Item, StrftimeItems};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use super::{LogRecord, LoggingError};
use crate::config::FormatterConfig;

const DEFAULT_FORMAT: &str = "%(message)s";
const DEFAULT_DATEFMT: &str = "%Y-%m-%d %H:%M:%S,%3f";
const DEFAULT_MESSAGE_TYPE: &str = "logstash";

/// Turns records into text lines or JSON documents.
#[derive(Debug, Clone)]
pub enum Formatter {
    Pattern(PatternFormatter),
    Logstash(LogstashFormatter),
}

impl Default for Formatter {
    fn default() -> Self {
        Formatter::Pattern(PatternFormatter::default())
    }
}

impl Formatter {
    pub fn from_config(config: &FormatterConfig) -> Result<Self, LoggingError> {
        if config.is_logstash() {
            return LogstashFormatter::from_config(config).map(Formatter::Logstash);
        }

        let pattern = PatternFormatter::new(config.format.as_deref().unwrap_or(DEFAULT_FORMAT))?;
        match config.datefmt.as_deref() {
            Some(datefmt) => pattern.with_datefmt(datefmt).map(Formatter::Pattern),
            None => Ok(Formatter::Pattern(pattern)),
        }
    }

    /// Single-line text form of the record.
    pub fn format(&self, record: &LogRecord) -> String {
        match self {
            Formatter::Pattern(pattern) => pattern.format(record),
            Formatter::Logstash(logstash) => logstash.to_json(record).to_string(),
        }
    }

    /// Document form of the record, as shipped to logstash.
    pub fn to_json(&self, record: &LogRecord) -> Value {
        match self {
            Formatter::Pattern(pattern) => json!({
                "@timestamp": utc_timestamp(record),
                "message": pattern.format(record),
                "level": record.level.name(),
                "logger_name": record.target,
            }),
            Formatter::Logstash(logstash) => logstash.to_json(record),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field {
        key: String,
        left: bool,
        width: usize,
        precision: Option<usize>,
    },
}

/// `%(key)s`-style pattern formatter.
#[derive(Debug, Clone)]
pub struct PatternFormatter {
    segments: Vec<Segment>,
    datefmt: String,
}

impl Default for PatternFormatter {
    fn default() -> Self {
        Self {
            segments: vec![Segment::Field {
                key: "message".to_string(),
                left: false,
                width: 0,
                precision: None,
            }],
            datefmt: DEFAULT_DATEFMT.to_string(),
        }
    }
}

impl PatternFormatter {
    pub fn new(format: &str) -> Result<Self, LoggingError> {
        Ok(Self {
            segments: parse_pattern(format)?,
            datefmt: DEFAULT_DATEFMT.to_string(),
        })
    }

    /// Timestamp format for `%(asctime)s`, in strftime syntax.
    pub fn with_datefmt(mut self, datefmt: &str) -> Result<Self, LoggingError> {
        if StrftimeItems::new(datefmt).any(|item| matches!(item, Item::Error)) {
            return Err(LoggingError::InvalidFormat {
                format: datefmt.to_string(),
                reason: "invalid date format".to_string(),
            });
        }
        self.datefmt = datefmt.to_string();
        Ok(self)
    }

    pub fn format(&self, record: &LogRecord) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field {
                    key,
                    left,
                    width,
                    precision,
                } => {
                    let mut value = self.value(key, record);
                    if let Some(precision) = precision {
                        value = match value.parse::<f64>() {
                            Ok(number) if key == "created" => format!("{:.*}", *precision, number),
                            _ => value.chars().take(*precision).collect(),
                        };
                    }
                    if *left {
                        out.push_str(&format!("{:<width$}", value, width = *width));
                    } else {
                        out.push_str(&format!("{:>width$}", value, width = *width));
                    }
                }
            }
        }
        out
    }

    fn value(&self, key: &str, record: &LogRecord) -> String {
        match key {
            "asctime" => record.timestamp.format(&self.datefmt).to_string(),
            "created" => format!("{:.6}", record.timestamp.timestamp_micros() as f64 / 1e6),
            "name" => record.target.clone(),
            "levelname" => record.level.name().to_string(),
            "levelno" => record.level.number().to_string(),
            "message" => record.full_message(),
            "module" => record.module().to_string(),
            "filename" => record.filename().to_string(),
            "pathname" => record.file.clone().unwrap_or_default(),
            "lineno" => record.line.unwrap_or(0).to_string(),
            "process" => std::process::id().to_string(),
            "threadName" => record.thread_name.clone(),
            other => record.field(other).unwrap_or_default().to_string(),
        }
    }
}

fn parse_pattern(format: &str) -> Result<Vec<Segment>, LoggingError> {
    let invalid = |reason: &str| LoggingError::InvalidFormat {
        format: format.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }

        match chars.next() {
            Some('%') => literal.push('%'),
            Some('(') => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some(')') => break,
                        Some(ch) => key.push(ch),
                        None => return Err(invalid("unterminated field name")),
                    }
                }

                let left = chars.next_if_eq(&'-').is_some();
                let width = read_number(&mut chars).unwrap_or(0);
                let precision = match chars.next_if_eq(&'.') {
                    Some(_) => Some(read_number(&mut chars).unwrap_or(0)),
                    None => None,
                };

                match chars.next() {
                    Some('s' | 'd' | 'i' | 'r' | 'f') => {}
                    Some(_) => return Err(invalid("unsupported conversion")),
                    None => return Err(invalid("missing conversion")),
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field {
                    key,
                    left,
                    width,
                    precision,
                });
            }
            Some(_) => return Err(invalid("expected '(' or '%' after '%'")),
            None => return Err(invalid("trailing '%'")),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn read_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut number: Option<usize> = None;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        number = Some(number.unwrap_or(0) * 10 + digit as usize);
        chars.next();
    }
    number
}

/// Formatter producing logstash JSON documents.
#[derive(Debug, Clone)]
pub struct LogstashFormatter {
    message_type: String,
    tags: Vec<String>,
    extra: Map<String, Value>,
}

impl LogstashFormatter {
    pub fn from_config(config: &FormatterConfig) -> Result<Self, LoggingError> {
        let extra = match &config.extra {
            Some(mapping) => {
                let value = serde_json::to_value(mapping).map_err(|e| {
                    LoggingError::InvalidFormat {
                        format: "extra".to_string(),
                        reason: e.to_string(),
                    }
                })?;
                match value {
                    Value::Object(map) => map,
                    _ => Map::new(),
                }
            }
            None => Map::new(),
        };

        Ok(Self {
            message_type: config
                .message_type
                .clone()
                .unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_string()),
            tags: config.tags.clone(),
            extra,
        })
    }

    pub fn to_json(&self, record: &LogRecord) -> Value {
        let mut extra = Map::new();
        if let Some(file) = &record.file {
            extra.insert("path".to_string(), Value::from(file.as_str()));
        }
        if let Some(line) = record.line {
            extra.insert("line".to_string(), Value::from(line));
        }
        extra.insert("thread_name".to_string(), Value::from(record.thread_name.as_str()));
        for (key, value) in &record.fields {
            extra.insert(key.clone(), Value::from(value.as_str()));
        }
        for (key, value) in &self.extra {
            extra.insert(key.clone(), value.clone());
        }

        json!({
            "@timestamp": utc_timestamp(record),
            "@version": "1",
            "message": record.message,
            "level": record.level.name(),
            "logger_name": record.target,
            "type": self.message_type,
            "tags": self.tags,
            "pid": std::process::id(),
            "extra": extra,
        })
    }
}

fn utc_timestamp(record: &LogRecord) -> String {
    record
        .timestamp
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
