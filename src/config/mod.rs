//! Application configuration loading and logging bootstrap.
//!
//! The application config is stored in an environment-specific YAML file under
//! `config/`: `config_prod.yml`, `config_acc.yml`, `config_test.yml` or
//! `config_dev.yml`. `CONFIG_FILENAME` names the file to use and falls back on
//! the development config when unset. General parameters shared by every
//! environment live in `config/parameters.yml` and win over the environment
//! file on key collisions.

mod duration;
mod env;
mod error;
mod logging;
mod template;

pub use env::{CONFIG_FILENAME, Environment, INSTANCE_ID, LOGSTASH_HTTP_PWD};
pub use error::ConfigError;
pub use logging::{FormatterConfig, HandlerConfig, HandlerKind, LoggerConfig, LoggingConfig};

use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::logging::LoggingBackend;
use crate::version::VersionResolver;

const CONFIG_DIR: &str = "config";
const DEFAULT_CONFIG_FILE: &str = "config_dev.yml";
const PARAMETERS_FILE: &str = "parameters.yml";
const LOGS_DIR: &str = "logs";

const LOGGING_KEY: &str = "logging";
const LOGSTASH_HANDLER: &str = "logstash_handler";
const SIMPLE_FORMATTER: &str = "simple";
const LOGSTASH_FORMATTER: &str = "logstash_formatter";

/// Directory that anchors config lookup: the crate root.
pub fn resolve_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Pick the config file named by the environment, using the default root.
pub fn select_config_path(env: &Environment) -> PathBuf {
    ConfigLoader::default().select_config_path(env)
}

/// Read a config file and overlay the shared parameters, using the default root.
pub fn read_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    ConfigLoader::default().read_config(path)
}

/// Merged application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    path: PathBuf,
    values: Mapping,
}

impl AppConfig {
    pub fn new(path: impl Into<PathBuf>, values: Mapping) -> Self {
        Self {
            path: path.into(),
            values,
        }
    }

    /// File the environment config was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn values(&self) -> &Mapping {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Loads environment configs relative to a project root and bootstraps logging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    root: PathBuf,
    logs_dir: PathBuf,
    version: VersionResolver,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(resolve_root())
    }
}

impl ConfigLoader {
    /// Creates a loader for the given project root.
    ///
    /// The logs directory defaults to `logs` in the current working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            version: VersionResolver::new(&root),
            logs_dir: PathBuf::from(LOGS_DIR),
            root,
        }
    }

    pub fn with_logs_dir(mut self, logs_dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = logs_dir.into();
        self
    }

    pub fn with_version_resolver(mut self, resolver: VersionResolver) -> Self {
        self.version = resolver;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Path of the environment config: `config/<CONFIG_FILENAME>` or the
    /// development config when the variable is unset.
    pub fn select_config_path(&self, env: &Environment) -> PathBuf {
        let config_dir = self.root.join(CONFIG_DIR);
        match env.config_filename.as_deref() {
            Some(filename) => config_dir.join(filename),
            None => {
                eprintln!(
                    "{} environment variable not defined. Falling back on development config.",
                    CONFIG_FILENAME
                );
                config_dir.join(DEFAULT_CONFIG_FILE)
            }
        }
    }

    /// Read the config file at `path` and overlay `config/parameters.yml` if it exists.
    pub fn read_config(&self, path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let mut values = read_mapping(path)?;

        let params_path = self.root.join(CONFIG_DIR).join(PARAMETERS_FILE);
        if params_path.exists() {
            for (key, value) in read_mapping(&params_path)? {
                values.insert(key, value);
            }
        }

        Ok(AppConfig::new(path, values))
    }

    /// Prepare the `logging` section of `config` and apply it to `backend`.
    ///
    /// Fills the instance id and application version into the formatter
    /// templates, creates the logs directory and hands the result to the
    /// backend. Nothing reaches the backend when the section is missing or a
    /// required secret is absent. Returns the resolved application version.
    pub async fn initialize_logging(
        &self,
        config: &mut AppConfig,
        env: &Environment,
        backend: &dyn LoggingBackend,
    ) -> Result<String, ConfigError> {
        let path = config.path.clone();
        let logging = config
            .values
            .get_mut(LOGGING_KEY)
            .ok_or_else(|| ConfigError::MissingLogging(path.clone()))?
            .as_mapping_mut()
            .ok_or_else(|| {
                ConfigError::Validation(format!("{}: logging must be a mapping", path.display()))
            })?;

        if requires_logstash_password(logging) && env.logstash_http_pwd.is_none() {
            return Err(ConfigError::MissingEnv(LOGSTASH_HTTP_PWD));
        }

        let instance_id = env.instance_id.as_deref();
        fill_simple_format(logging, instance_id);

        let version = self.version.get_version().await?;
        fill_logstash_extra(logging, &version, instance_id);

        fs::create_dir_all(&self.logs_dir).map_err(|source| ConfigError::LogsDir {
            path: self.logs_dir.clone(),
            source,
        })?;

        let mut logging_config: LoggingConfig =
            serde_yaml::from_value(Value::Mapping(logging.clone()))?;
        logging_config.load_credentials_from_env(env);

        backend.apply(logging_config)?;

        info!(path = %path.display(), "Config loaded from {}", path.display());
        info!(version = %version, "Application version: {}", version);

        Ok(version)
    }
}

fn read_mapping(path: &Path) -> Result<Mapping, ConfigError> {
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Mapping::new());
    }

    match serde_yaml::from_str::<Value>(&content)? {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(ConfigError::Validation(format!(
            "{}: top level must be a mapping",
            path.display()
        ))),
    }
}

fn requires_logstash_password(logging: &Mapping) -> bool {
    let Some(handlers) = logging.get("handlers").and_then(Value::as_mapping) else {
        return false;
    };

    handlers.iter().any(|(name, handler)| {
        let is_logstash = name.as_str() == Some(LOGSTASH_HANDLER)
            || handler
                .get("class")
                .and_then(Value::as_str)
                .and_then(HandlerKind::from_class)
                == Some(HandlerKind::Logstash);
        let enabled = handler.get("enable").and_then(Value::as_bool).unwrap_or(true);
        is_logstash && enabled
    })
}

fn formatter_mut<'a>(logging: &'a mut Mapping, name: &str) -> Option<&'a mut Mapping> {
    logging
        .get_mut("formatters")?
        .as_mapping_mut()?
        .get_mut(name)?
        .as_mapping_mut()
}

fn fill_in_place(mapping: &mut Mapping, key: &str, arg: &str) {
    if let Some(value) = mapping.get_mut(key) {
        if let Some(filled) = value.as_str().map(|t| template::fill(t, arg)) {
            *value = Value::String(filled);
        }
    }
}

fn fill_simple_format(logging: &mut Mapping, instance_id: Option<&str>) {
    let suffix = instance_id
        .map(|id| format!(" ({})", id))
        .unwrap_or_default();

    if let Some(simple) = formatter_mut(logging, SIMPLE_FORMATTER) {
        fill_in_place(simple, "format", &suffix);
    }
}

fn fill_logstash_extra(logging: &mut Mapping, version: &str, instance_id: Option<&str>) {
    let Some(extra) = formatter_mut(logging, LOGSTASH_FORMATTER)
        .and_then(|formatter| formatter.get_mut("extra"))
        .and_then(Value::as_mapping_mut)
    else {
        return;
    };

    fill_in_place(extra, "version", version);

    match instance_id {
        Some(id) => fill_in_place(extra, "instance_id", id),
        None => {
            extra.remove("instance_id");
        }
    }
}

#[cfg(test)]
mod tests;
