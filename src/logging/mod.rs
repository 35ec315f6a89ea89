//! Process-wide logging configured from the `logging` config section.
//!
//! A single tracing layer is installed the first time a configuration is
//! applied. Later configurations replace the routing table in place, so the
//! global subscriber never has to be swapped.

mod error;
mod formatter;
mod handler;
mod level;
mod logstash;
mod record;
mod router;

pub use error::LoggingError;
pub use formatter::{Formatter, LogstashFormatter, PatternFormatter};
pub use handler::{Handler, RotatingFile, Sink};
pub use level::LogLevel;
pub use logstash::{HttpTransport, LogstashShipper, Transport};
pub use record::LogRecord;
pub use router::Router;

use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use router::{DispatchLayer, SharedRouter};

static GLOBAL_ROUTER: OnceLock<SharedRouter> = OnceLock::new();

/// Something that can take over the process logging configuration.
pub trait LoggingBackend: Send + Sync {
    /// Apply `config`, replacing whatever configuration was active.
    fn apply(&self, config: LoggingConfig) -> Result<(), LoggingError>;
}

/// Backend routing all `tracing` events of the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBackend;

impl LoggingBackend for TracingBackend {
    fn apply(&self, config: LoggingConfig) -> Result<(), LoggingError> {
        let router = Router::build(&config)?;
        let shared = install()?;

        let previous = shared
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(router);

        // Dropping the old table closes its shipping queues; workers drain them.
        if let Some(previous) = previous {
            previous.flush();
        }
        Ok(())
    }
}

fn install() -> Result<&'static SharedRouter, LoggingError> {
    if let Some(shared) = GLOBAL_ROUTER.get() {
        return Ok(shared);
    }

    let shared: SharedRouter = Arc::new(RwLock::new(None));
    tracing_subscriber::registry()
        .with(DispatchLayer::new(Arc::clone(&shared)))
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(GLOBAL_ROUTER.get_or_init(|| shared))
}

/// Flush and close every handler of the active configuration.
///
/// Records emitted afterwards are discarded until a configuration is applied again.
pub async fn shutdown() {
    let Some(shared) = GLOBAL_ROUTER.get() else {
        return;
    };

    let router = shared
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();

    if let Some(router) = router {
        router.close().await;
    }
}
