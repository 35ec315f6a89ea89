//! Environment variables read during bootstrap.

use std::env;

pub const CONFIG_FILENAME: &str = "CONFIG_FILENAME";
pub const LOGSTASH_HTTP_PWD: &str = "LOGSTASH_HTTP_PWD";
pub const INSTANCE_ID: &str = "INSTANCE_ID";

/// Snapshot of the bootstrap environment variables.
///
/// Taken once so the loader never reads the process environment halfway
/// through initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// File name of the environment config under `config/`.
    pub config_filename: Option<String>,
    /// Password for the logstash HTTP handler.
    pub logstash_http_pwd: Option<String>,
    /// Identifier of this process instance, substituted into log formats.
    pub instance_id: Option<String>,
}

impl Environment {
    /// Read the variables from the process environment, loading `.env` first
    /// if it exists.
    pub fn from_process() -> Self {
        dotenvy::dotenv().ok();

        Self {
            config_filename: env::var(CONFIG_FILENAME).ok(),
            logstash_http_pwd: env::var(LOGSTASH_HTTP_PWD).ok(),
            instance_id: env::var(INSTANCE_ID).ok(),
        }
    }
}
