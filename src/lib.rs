//! Application bootstrap: environment-specific YAML configuration,
//! process-wide logging and application version lookup.
//!
//! ```no_run
//! # async fn run() -> Result<(), pipple_bootstrap::ConfigError> {
//! let app = pipple_bootstrap::bootstrap().await?;
//! tracing::info!(version = %app.version, "started");
//! pipple_bootstrap::shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod version;

pub use config::{AppConfig, ConfigError, ConfigLoader, Environment};
pub use logging::{LoggingBackend, TracingBackend, shutdown};
pub use version::{VersionResolver, get_version};

/// Loaded configuration and resolved version.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub config: AppConfig,
    pub version: String,
}

/// Load the environment config selected by `CONFIG_FILENAME` and configure
/// process-wide logging from it.
pub async fn bootstrap() -> Result<Bootstrap, ConfigError> {
    let env = Environment::from_process();
    let loader = ConfigLoader::default();

    let path = loader.select_config_path(&env);
    let mut config = loader.read_config(&path)?;
    let version = loader
        .initialize_logging(&mut config, &env, &TracingBackend)
        .await?;

    Ok(Bootstrap { config, version })
}
