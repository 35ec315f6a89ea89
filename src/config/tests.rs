//! Tests for config module.

use super::*;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

use crate::logging::LoggingError;

// ==================== Helpers ====================

/// Backend that only records what it was asked to apply.
#[derive(Default)]
struct RecordingBackend {
    applied: Mutex<Vec<LoggingConfig>>,
}

impl RecordingBackend {
    fn calls(&self) -> usize {
        self.applied.lock().unwrap().len()
    }

    fn last(&self) -> LoggingConfig {
        self.applied.lock().unwrap().last().cloned().unwrap()
    }
}

impl LoggingBackend for RecordingBackend {
    fn apply(&self, config: LoggingConfig) -> Result<(), LoggingError> {
        self.applied.lock().unwrap().push(config);
        Ok(())
    }
}

/// Project root in a temp dir with a version file, so git is never called.
struct Project {
    dir: TempDir,
    loader: ConfigLoader,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::create_dir_all(dir.path().join("version")).unwrap();
        fs::write(dir.path().join("version/version.txt"), "1.0.0").unwrap();

        let loader = ConfigLoader::new(dir.path()).with_logs_dir(dir.path().join("logs"));
        Self { dir, loader }
    }

    fn write(&self, name: &str, yaml: &str) -> PathBuf {
        let path = self.dir.path().join("config").join(name);
        fs::write(&path, yaml).unwrap();
        path
    }

    fn load(&self, yaml: &str) -> AppConfig {
        let path = self.write("config_test.yml", yaml);
        self.loader.read_config(path).unwrap()
    }
}

fn env_with(instance_id: Option<&str>, logstash_pwd: Option<&str>) -> Environment {
    Environment {
        config_filename: None,
        logstash_http_pwd: logstash_pwd.map(str::to_string),
        instance_id: instance_id.map(str::to_string),
    }
}

fn full_logging_yaml(logstash_enabled: bool) -> String {
    format!(
        r#"
app_name: pipple
logging:
  version: 1
  disable_existing_loggers: false
  formatters:
    simple:
      format: "%(asctime)s - %(name)s{{}} - %(levelname)s - %(message)s"
    logstash_formatter:
      class: logstash_async.formatter.LogstashFormatter
      message_type: pipple
      extra:
        application: pipple
        version: "v{{}}"
        instance_id: "{{}}"
  handlers:
    console:
      class: logging.StreamHandler
      level: DEBUG
      formatter: simple
      stream: ext://sys.stdout
    logstash_handler:
      class: logstash_async.handler.AsynchronousLogstashHandler
      enable: {}
      formatter: logstash_formatter
      host: logs.example.com
      port: 8080
      username: pipple
  root:
    level: INFO
    handlers: [console, logstash_handler]
"#,
        logstash_enabled
    )
}

fn formatter_str<'a>(config: &'a AppConfig, formatter: &str, path: &[&str]) -> Option<&'a str> {
    let mut value = config.get("logging")?.get("formatters")?.get(formatter)?;
    for key in path {
        value = value.get(*key)?;
    }
    value.as_str()
}

// ==================== Duration parsing tests ====================

#[test]
fn test_parse_duration_units() {
    assert_eq!(duration::parse_duration("30s").unwrap(), Duration::from_secs(30));
    assert_eq!(duration::parse_duration("5m").unwrap(), Duration::from_secs(300));
    assert_eq!(duration::parse_duration("2h").unwrap(), Duration::from_secs(7200));
    assert_eq!(duration::parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(duration::parse_duration("1.5").unwrap(), Duration::from_millis(1500));
    assert_eq!(duration::parse_duration("").unwrap(), Duration::ZERO);
}

#[test]
fn test_parse_duration_invalid_unit() {
    let result = duration::parse_duration("10d");
    assert!(result.unwrap_err().contains("unknown duration unit"));
}

#[test]
fn test_handler_timeout_accepts_number_or_string() {
    let handler: HandlerConfig = serde_yaml::from_str("class: x\ntimeout: 3").unwrap();
    assert_eq!(handler.timeout, Duration::from_secs(3));

    let handler: HandlerConfig = serde_yaml::from_str("class: x\ntimeout: 750ms").unwrap();
    assert_eq!(handler.timeout, Duration::from_millis(750));

    let handler: HandlerConfig = serde_yaml::from_str("class: x").unwrap();
    assert_eq!(handler.timeout, Duration::ZERO);
    assert!(handler.enable);
    assert!(handler.ssl_enable);
}

#[test]
fn test_overflowing_durations_are_errors() {
    let err = duration::parse_duration("99999999999999999999999h").unwrap_err();
    assert!(err.contains("invalid duration"));

    let result = serde_yaml::from_str::<HandlerConfig>("class: x\ntimeout: 1e30");
    assert!(result.is_err());

    let result = serde_yaml::from_str::<HandlerConfig>("class: x\ntimeout: -1");
    assert!(result.is_err());
}

// ==================== Template tests ====================

#[test]
fn test_fill_placeholders() {
    assert_eq!(template::fill("name{} - msg", " (7)"), "name (7) - msg");
    assert_eq!(template::fill("{0}/{}", "x"), "x/x");
    assert_eq!(template::fill("{{literal}} {}", "v"), "{literal} v");
    assert_eq!(template::fill("no placeholder", "v"), "no placeholder");
    assert_eq!(template::fill("{name} {", "v"), "{name} {");
}

// ==================== Path selection tests ====================

#[test]
fn test_select_config_path_defaults_to_dev() {
    let loader = ConfigLoader::new("/srv/pipple");

    let path = loader.select_config_path(&Environment::default());

    assert_eq!(path, PathBuf::from("/srv/pipple/config/config_dev.yml"));
}

#[test]
fn test_select_config_path_uses_env_filename() {
    let loader = ConfigLoader::new("/srv/pipple");
    let env = Environment {
        config_filename: Some("config_prod.yml".to_string()),
        ..Default::default()
    };

    let path = loader.select_config_path(&env);

    assert_eq!(path, PathBuf::from("/srv/pipple/config/config_prod.yml"));
}

#[test]
fn test_resolve_root_is_crate_root() {
    assert!(resolve_root().join("Cargo.toml").exists());
}

// ==================== read_config tests ====================

#[test]
fn test_read_config_missing_file() {
    let project = Project::new();

    let err = project
        .loader
        .read_config("config/does_not_exist.yml")
        .unwrap_err();

    assert!(matches!(
        err,
        ConfigError::NotFound(ref p) if p == Path::new("config/does_not_exist.yml")
    ));
    assert!(err.to_string().contains("config/does_not_exist.yml"));
}

#[test]
fn test_read_config_without_parameters() {
    let project = Project::new();

    let config = project.load("database:\n  host: localhost\nlogging: {}\n");

    assert_eq!(config.values().len(), 2);
    assert_eq!(config.get("database").unwrap()["host"].as_str(), Some("localhost"));
    assert!(config.path().ends_with("config/config_test.yml"));
}

#[test]
fn test_read_config_parameters_overlay() {
    let project = Project::new();
    project.write(
        "parameters.yml",
        r#"
threshold: 0.8
database:
  host: params-db
"#,
    );

    let config = project.load(
        r#"
database:
  host: env-db
  port: 5432
logging: {}
"#,
    );

    let keys: Vec<&str> = config.values().keys().filter_map(Value::as_str).collect();
    assert_eq!(keys, vec!["database", "logging", "threshold"]);
    // Overlay replaces the whole top-level value
    assert_eq!(config.get("database").unwrap()["host"].as_str(), Some("params-db"));
    assert!(config.get("database").unwrap().get("port").is_none());
    assert_eq!(config.get("threshold").unwrap().as_f64(), Some(0.8));
}

#[test]
fn test_read_config_empty_file() {
    let project = Project::new();

    let config = project.load("");

    assert!(config.values().is_empty());
}

#[test]
fn test_read_config_rejects_non_mapping() {
    let project = Project::new();
    let path = project.write("config_list.yml", "- a\n- b\n");

    let err = project.loader.read_config(path).unwrap_err();

    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn test_read_config_invalid_yaml() {
    let project = Project::new();
    let path = project.write("config_bad.yml", "logging: [unclosed\n");

    let err = project.loader.read_config(path).unwrap_err();

    assert!(matches!(err, ConfigError::Parse(_)));
}

// ==================== initialize_logging tests ====================

#[tokio::test]
async fn test_missing_logging_section() {
    let project = Project::new();
    let mut config = project.load("app_name: pipple\n");
    let backend = RecordingBackend::default();

    let err = project
        .loader
        .initialize_logging(&mut config, &env_with(None, None), &backend)
        .await
        .unwrap_err();

    assert!(matches!(err, ConfigError::MissingLogging(_)));
    assert!(err.to_string().contains("config_test.yml"));
    assert_eq!(backend.calls(), 0);
    assert!(!project.dir.path().join("logs").exists());
}

#[tokio::test]
async fn test_logstash_enabled_requires_password() {
    let project = Project::new();
    let mut config = project.load(&full_logging_yaml(true));
    let backend = RecordingBackend::default();

    let err = project
        .loader
        .initialize_logging(&mut config, &env_with(Some("7"), None), &backend)
        .await
        .unwrap_err();

    assert!(matches!(err, ConfigError::MissingEnv(LOGSTASH_HTTP_PWD)));
    assert_eq!(err.to_string(), "LOGSTASH_HTTP_PWD environment variable is not defined");
    assert_eq!(backend.calls(), 0);
    // Nothing was substituted before failing
    assert_eq!(
        formatter_str(&config, "logstash_formatter", &["extra", "instance_id"]),
        Some("{}")
    );
}

#[tokio::test]
async fn test_logstash_password_loaded_into_handler() {
    let project = Project::new();
    let mut config = project.load(&full_logging_yaml(true));
    let backend = RecordingBackend::default();

    project
        .loader
        .initialize_logging(&mut config, &env_with(None, Some("s3cret")), &backend)
        .await
        .unwrap();

    let applied = backend.last();
    let logstash = &applied.handlers["logstash_handler"];
    assert_eq!(logstash.password.as_deref(), Some("s3cret"));
    assert_eq!(logstash.kind(), Some(HandlerKind::Logstash));
    assert_eq!(applied.handlers["console"].password, None);
}

#[tokio::test]
async fn test_substitutions_without_instance_id() {
    let project = Project::new();
    let mut config = project.load(&full_logging_yaml(false));
    let backend = RecordingBackend::default();

    let version = project
        .loader
        .initialize_logging(&mut config, &env_with(None, None), &backend)
        .await
        .unwrap();

    assert_eq!(version, "1.0.0");
    assert_eq!(
        formatter_str(&config, "simple", &["format"]),
        Some("%(asctime)s - %(name)s - %(levelname)s - %(message)s")
    );
    assert_eq!(
        formatter_str(&config, "logstash_formatter", &["extra", "version"]),
        Some("v1.0.0")
    );
    assert_eq!(formatter_str(&config, "logstash_formatter", &["extra", "instance_id"]), None);

    let applied = backend.last();
    let extra = applied.formatters["logstash_formatter"].extra.as_ref().unwrap();
    assert!(extra.get("instance_id").is_none());
    assert_eq!(extra.get("application").and_then(Value::as_str), Some("pipple"));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_substitutions_with_instance_id() {
    let project = Project::new();
    let mut config = project.load(&full_logging_yaml(false));
    let backend = RecordingBackend::default();

    project
        .loader
        .initialize_logging(&mut config, &env_with(Some("7"), None), &backend)
        .await
        .unwrap();

    assert_eq!(
        formatter_str(&config, "simple", &["format"]),
        Some("%(asctime)s - %(name)s (7) - %(levelname)s - %(message)s")
    );
    assert_eq!(
        formatter_str(&config, "logstash_formatter", &["extra", "instance_id"]),
        Some("7")
    );
    assert_eq!(
        backend.last().formatters["simple"].format.as_deref(),
        Some("%(asctime)s - %(name)s (7) - %(levelname)s - %(message)s")
    );
}

#[tokio::test]
async fn test_logs_directory_created() {
    let project = Project::new();
    let mut config = project.load("logging:\n  version: 1\n");
    let backend = RecordingBackend::default();

    project
        .loader
        .initialize_logging(&mut config, &env_with(None, None), &backend)
        .await
        .unwrap();

    assert!(project.dir.path().join("logs").is_dir());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_formatters_without_templates_untouched() {
    let project = Project::new();
    let mut config = project.load(
        r#"
logging:
  formatters:
    simple:
      datefmt: "%H:%M"
    logstash_formatter:
      class: logstash_async.formatter.LogstashFormatter
"#,
    );
    let backend = RecordingBackend::default();

    project
        .loader
        .initialize_logging(&mut config, &env_with(Some("3"), None), &backend)
        .await
        .unwrap();

    assert_eq!(formatter_str(&config, "simple", &["datefmt"]), Some("%H:%M"));
    assert!(backend.last().formatters["logstash_formatter"].extra.is_none());
}

#[tokio::test]
async fn test_logging_section_must_be_mapping() {
    let project = Project::new();
    let mut config = project.load("logging: verbose\n");
    let backend = RecordingBackend::default();

    let err = project
        .loader
        .initialize_logging(&mut config, &env_with(None, None), &backend)
        .await
        .unwrap_err();

    assert!(matches!(err, ConfigError::Validation(_)));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_version_failure_aborts_before_backend() {
    let project = Project::new();
    let resolver = VersionResolver::new(project.dir.path())
        .with_version_file(project.dir.path().join("missing.txt"))
        .with_git_program(project.dir.path().join("no-such-git"));
    let loader = project.loader.clone().with_version_resolver(resolver);
    let mut config = project.load(&full_logging_yaml(false));
    let backend = RecordingBackend::default();

    let err = loader
        .initialize_logging(&mut config, &env_with(None, None), &backend)
        .await
        .unwrap_err();

    assert!(matches!(err, ConfigError::Version(_)));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_oversized_handler_timeout_is_parse_error() {
    let project = Project::new();
    let yaml = "\
logging:
  version: 1
  handlers:
    console:
      class: logging.StreamHandler
      timeout: 1e30
  root:
    handlers: [console]
";
    let mut config = project.load(yaml);
    let backend = RecordingBackend::default();

    let err = project
        .loader
        .initialize_logging(&mut config, &env_with(None, None), &backend)
        .await
        .unwrap_err();

    assert!(matches!(err, ConfigError::Parse(_)));
    assert_eq!(backend.calls(), 0);
}
