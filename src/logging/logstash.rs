//! Log shipping to a logstash HTTP input.
//!
//! Records are queued without blocking the caller and posted in JSON batches
//! by a background worker. Closing the shipper drains the queue first.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::LoggingError;
use crate::config::HandlerConfig;

/// Target of the shipper's own diagnostics.
pub(crate) const SHIPPER_TARGET: &str = module_path!();

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_QUEUE_SIZE: usize = 1000;
const DEFAULT_BATCH_SIZE: usize = 50;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivers batches of logstash documents.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, events: &[Value]) -> Result<(), LoggingError>;
}

/// Posts batches as a JSON array to the logstash `http` input.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpTransport {
    pub fn from_config(name: &str, config: &HandlerConfig) -> Result<Self, LoggingError> {
        let host = config
            .host
            .as_deref()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| LoggingError::Handler(name.to_string(), "host is required".into()))?;

        let scheme = if config.ssl_enable { "https" } else { "http" };
        let port = config.port.unwrap_or(DEFAULT_PORT);
        let path = config.path.as_deref().unwrap_or("/");
        let path = path.strip_prefix('/').unwrap_or(path);
        let url = format!("{}://{}:{}/{}", scheme, host, port, path);

        let timeout = if config.timeout.is_zero() {
            DEFAULT_HTTP_TIMEOUT
        } else {
            config.timeout
        };
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, events: &[Value]) -> Result<(), LoggingError> {
        let mut request = self.client.post(&self.url).json(events);
        if let Some(ref username) = self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| LoggingError::Transport(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LoggingError::Transport(format!(
                "logstash returned {} - {}",
                status, body
            )));
        }

        Ok(())
    }
}

/// Queue plus background worker feeding a [`Transport`].
pub struct LogstashShipper {
    sender: Mutex<Option<mpsc::Sender<Value>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LogstashShipper {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(
        name: &str,
        transport: Arc<dyn Transport>,
        queue_size: Option<usize>,
        batch_size: Option<usize>,
    ) -> Result<Self, LoggingError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| LoggingError::NoRuntime(name.to_string()))?;

        let queue_size = queue_size.filter(|n| *n > 0).unwrap_or(DEFAULT_QUEUE_SIZE);
        let batch_size = batch_size.filter(|n| *n > 0).unwrap_or(DEFAULT_BATCH_SIZE);
        let (sender, receiver) = mpsc::channel(queue_size);

        let worker = runtime.spawn(Self::run_worker(receiver, transport, batch_size));

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    async fn run_worker(
        mut receiver: mpsc::Receiver<Value>,
        transport: Arc<dyn Transport>,
        batch_size: usize,
    ) {
        while let Some(first) = receiver.recv().await {
            let mut batch = vec![first];
            while batch.len() < batch_size {
                match receiver.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(_) => break,
                }
            }

            if let Err(e) = transport.send(&batch).await {
                warn!(error = %e, dropped = batch.len(), "Failed to ship log records to logstash");
            }
        }
    }

    /// Queue a document. Never blocks; a full queue drops the document.
    pub fn ship(&self, event: Value) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref sender) = *sender {
            if let Err(e) = sender.try_send(event) {
                eprintln!("Failed to queue log record for logstash: {}", e);
            }
        }
    }

    /// Stop accepting documents and wait for the worker to drain the queue.
    pub async fn close(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if tokio::time::timeout(CLOSE_TIMEOUT, worker).await.is_err() {
                eprintln!("Timed out flushing log records to logstash");
            }
        }
    }
}
