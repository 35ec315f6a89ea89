//! Logger hierarchy and the tracing layer feeding it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{Event, Subscriber};
use tracing_log::NormalizeEvent;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use super::{Formatter, Handler, LogLevel, LogRecord, LoggingError};
use crate::config::LoggingConfig;

/// Level of the root logger when the config does not set one.
const DEFAULT_ROOT_LEVEL: LogLevel = LogLevel::Warning;
const ROOT_LOGGER: &str = "root";

/// Routing table shared between the layer and the backend.
pub(crate) type SharedRouter = Arc<RwLock<Option<Router>>>;

struct LoggerNode {
    name: String,
    prefix: String,
    level: Option<LogLevel>,
    handlers: Vec<Arc<Handler>>,
    propagate: bool,
}

impl LoggerNode {
    fn new(
        name: &str,
        level: Option<LogLevel>,
        handlers: Vec<Arc<Handler>>,
        propagate: bool,
    ) -> Self {
        let name = name.replace('.', "::");
        Self {
            prefix: format!("{}::", name),
            name,
            level,
            handlers,
            propagate,
        }
    }

    fn matches(&self, target: &str) -> bool {
        target == self.name || target.starts_with(&self.prefix)
    }

    fn depth(&self) -> usize {
        self.name.split("::").count()
    }
}

/// Dispatches records through named loggers to their handlers.
///
/// A record goes to every logger whose name is its target or a `::` ancestor
/// of it, most specific first, and finally to the root logger. A logger with
/// `propagate: false` ends the walk.
pub struct Router {
    root: LoggerNode,
    loggers: Vec<LoggerNode>,
    handlers: Vec<Arc<Handler>>,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            root: LoggerNode::new(ROOT_LOGGER, None, Vec::new(), false),
            loggers: Vec::new(),
            handlers: Vec::new(),
        }
    }
}

impl Router {
    pub fn with_root(mut self, level: Option<LogLevel>, handlers: Vec<Arc<Handler>>) -> Self {
        self.track(&handlers);
        self.root = LoggerNode::new(ROOT_LOGGER, level, handlers, false);
        self
    }

    pub fn with_logger(
        mut self,
        name: &str,
        level: Option<LogLevel>,
        handlers: Vec<Arc<Handler>>,
        propagate: bool,
    ) -> Self {
        self.track(&handlers);
        self.loggers.push(LoggerNode::new(name, level, handlers, propagate));
        self.loggers.sort_by_key(|logger| std::cmp::Reverse(logger.depth()));
        self
    }

    fn track(&mut self, handlers: &[Arc<Handler>]) {
        for handler in handlers {
            if !self.handlers.iter().any(|known| Arc::ptr_eq(known, handler)) {
                self.handlers.push(Arc::clone(handler));
            }
        }
    }

    /// Build formatters, enabled handlers and loggers from the config.
    ///
    /// Loggers may reference disabled handlers; those references are dropped.
    pub fn build(config: &LoggingConfig) -> Result<Self, LoggingError> {
        let mut formatters = HashMap::new();
        for (name, formatter) in &config.formatters {
            formatters.insert(name.as_str(), Arc::new(Formatter::from_config(formatter)?));
        }
        let default_formatter = Arc::new(Formatter::default());

        let mut handlers = HashMap::new();
        for (name, handler) in &config.handlers {
            if !handler.enable {
                continue;
            }

            let formatter = match handler.formatter.as_deref() {
                Some(formatter) => formatters.get(formatter).cloned().ok_or_else(|| {
                    LoggingError::UnknownFormatter {
                        handler: name.clone(),
                        formatter: formatter.to_string(),
                    }
                })?,
                None => Arc::clone(&default_formatter),
            };

            let built = Handler::from_config(name, handler, formatter)?;
            handlers.insert(name.as_str(), Arc::new(built));
        }

        let resolve = |logger: &str, names: &[String]| -> Result<Vec<Arc<Handler>>, LoggingError> {
            let mut resolved = Vec::new();
            for name in names {
                match handlers.get(name.as_str()) {
                    Some(handler) => resolved.push(Arc::clone(handler)),
                    None if config.handlers.contains_key(name) => {}
                    None => {
                        return Err(LoggingError::UnknownHandler {
                            logger: logger.to_string(),
                            handler: name.clone(),
                        });
                    }
                }
            }
            Ok(resolved)
        };

        let mut router = Router::default();
        if let Some(root) = &config.root {
            router = router.with_root(root.level, resolve(ROOT_LOGGER, &root.handlers)?);
        }
        for (name, logger) in &config.loggers {
            let logger_handlers = resolve(name.as_str(), &logger.handlers)?;
            router = router.with_logger(name, logger.level, logger_handlers, logger.propagate);
        }

        Ok(router)
    }

    /// Effective level for `target`: the first explicit level walking up to root.
    ///
    /// `NOTSET` on a named logger defers to its parent.
    pub fn effective_level(&self, target: &str) -> LogLevel {
        self.chain(target)
            .find_map(|logger| logger.level.filter(|level| *level != LogLevel::NotSet))
            .or(self.root.level)
            .unwrap_or(DEFAULT_ROOT_LEVEL)
    }

    pub fn enabled(&self, target: &str, level: LogLevel) -> bool {
        level >= self.effective_level(target)
    }

    fn chain<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a LoggerNode> + 'a {
        self.loggers.iter().filter(move |logger| logger.matches(target))
    }

    pub fn route(&self, record: &LogRecord) {
        if !self.enabled(&record.target, record.level) {
            return;
        }

        for logger in self.chain(&record.target) {
            for handler in &logger.handlers {
                handler.handle(record);
            }
            if !logger.propagate {
                return;
            }
        }

        for handler in &self.root.handlers {
            handler.handle(record);
        }
    }

    pub fn flush(&self) {
        for handler in &self.handlers {
            handler.flush();
        }
    }

    /// Flush every handler and stop background shipping.
    pub async fn close(self) {
        for handler in &self.handlers {
            handler.close().await;
        }
    }
}

/// Layer that turns tracing events into records for the current router.
pub(crate) struct DispatchLayer {
    router: SharedRouter,
}

impl DispatchLayer {
    pub(crate) fn new(router: SharedRouter) -> Self {
        Self { router }
    }
}

impl<S: Subscriber> Layer<S> for DispatchLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let router = self.router.read().unwrap_or_else(PoisonError::into_inner);
        let Some(router) = router.as_ref() else {
            return;
        };

        let normalized = event.normalized_metadata();
        let metadata = normalized.as_ref().unwrap_or_else(|| event.metadata());
        if router.enabled(metadata.target(), LogLevel::from(metadata.level())) {
            router.route(&LogRecord::from_event(event));
        }
    }
}
