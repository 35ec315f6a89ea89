//! Log records captured from tracing events.

use chrono::{DateTime, Local};
use std::fmt;
use tracing::field::{Field, Visit};
use tracing_log::NormalizeEvent;

use super::LogLevel;

/// A single log event, detached from the tracing callsite.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    /// Logger name: the tracing target, usually the module path.
    pub target: String,
    pub module_path: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub thread_name: String,
    pub message: String,
    /// Structured fields other than `message`, in recording order.
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            target: target.into(),
            module_path: None,
            file: None,
            line: None,
            thread_name: current_thread_name(),
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Record for `event`. Events bridged from the `log` crate keep their
    /// original target, file and line.
    pub fn from_event(event: &tracing::Event<'_>) -> Self {
        let normalized = event.normalized_metadata();
        let metadata = normalized.as_ref().unwrap_or_else(|| event.metadata());
        let mut visitor = FieldVisitor {
            skip_log_fields: normalized.is_some(),
            ..FieldVisitor::default()
        };
        event.record(&mut visitor);

        Self {
            timestamp: Local::now(),
            level: LogLevel::from(metadata.level()),
            target: metadata.target().to_string(),
            module_path: metadata.module_path().map(str::to_string),
            file: metadata.file().map(str::to_string),
            line: metadata.line(),
            thread_name: current_thread_name(),
            message: visitor.message,
            fields: visitor.fields,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Message followed by the structured fields as ` key=value` pairs.
    pub fn full_message(&self) -> String {
        let mut out = self.message.clone();
        for (key, value) in &self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    /// Last segment of the module path.
    pub fn module(&self) -> &str {
        let path = self.module_path.as_deref().unwrap_or(&self.target);
        path.rsplit("::").next().unwrap_or(path)
    }

    pub fn filename(&self) -> &str {
        let file = self.file.as_deref().unwrap_or_default();
        file.rsplit(['/', '\\']).next().unwrap_or(file)
    }
}

fn current_thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string()
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
    skip_log_fields: bool,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: String) {
        if self.skip_log_fields && field.name().starts_with("log.") {
            return;
        }
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{:?}", value));
    }
}
