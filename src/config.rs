use crate::services::inventory::DEFAULT_LOW_STOCK_THRESHOLD;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_DATABASE_URL: &str = "sqlite://inventory.db?mode=rwc";
const DEFAULT_ALERT_WORKERS: usize = 3;
const DEFAULT_ALERT_QUEUE_CAPACITY: usize = 100;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL (postgres:// or sqlite://)
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (non-development)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Per-request timeout applied by the HTTP stack
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Upper bound on waiting for a product row lock (milliseconds).
    /// Unset means the backend default.
    #[serde(default)]
    pub db_lock_timeout_ms: Option<u64>,

    /// Number of low-stock alert workers
    #[serde(default = "default_alert_workers")]
    #[validate(range(min = 1, max = 64))]
    pub alert_workers: usize,

    /// Capacity of the alert job queue; enqueue blocks when it is full
    #[serde(default = "default_alert_queue_capacity")]
    #[validate(range(min = 1))]
    pub alert_queue_capacity: usize,

    /// Threshold applied to products created without one; explicit
    /// thresholds must also be at least 1
    #[serde(default = "default_low_stock_threshold")]
    #[validate(range(min = 1))]
    pub default_low_stock_threshold: i32,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything except the
    /// connection and listener settings.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            request_timeout_secs: default_request_timeout_secs(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_lock_timeout_ms: None,
            alert_workers: default_alert_workers(),
            alert_queue_capacity: default_alert_queue_capacity(),
            default_low_stock_threshold: default_low_stock_threshold(),
        }
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Row-lock wait bound, if configured
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.db_lock_timeout_ms.map(Duration::from_millis)
    }

    /// Explicit CORS origins, empty entries skipped
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections cannot exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if !self.is_development() && self.cors_origins().is_empty() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message =
                Some("Set APP__CORS_ALLOWED_ORIGINS for non-development environments".into());
            errors.add("cors_allowed_origins", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_alert_workers() -> usize {
    DEFAULT_ALERT_WORKERS
}

fn default_alert_queue_capacity() -> usize {
    DEFAULT_ALERT_QUEUE_CAPACITY
}

fn default_low_stock_threshold() -> i32 {
    DEFAULT_LOW_STOCK_THRESHOLD
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("inventory_service={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn defaults_match_service_contract() {
        let cfg = base_config();
        assert_eq!(cfg.alert_workers, 3);
        assert_eq!(cfg.alert_queue_capacity, 100);
        assert_eq!(cfg.default_low_stock_threshold, 10);
        assert!(cfg.lock_timeout().is_none());
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://example.com, ,https://ops.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
        assert_eq!(cfg.cors_origins().len(), 2);
    }

    #[test]
    fn zero_workers_fail_validation() {
        let mut cfg = base_config();
        cfg.alert_workers = 0;
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("alert_workers"));
    }

    #[test]
    fn default_threshold_follows_product_minimum() {
        let mut cfg = base_config();
        cfg.default_low_stock_threshold = 0;
        let errors = cfg.validate().unwrap_err();
        assert!(errors
            .field_errors()
            .contains_key("default_low_stock_threshold"));

        cfg.default_low_stock_threshold = 1;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_queue_capacity_fails_validation() {
        let mut cfg = base_config();
        cfg.alert_queue_capacity = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn min_connections_cannot_exceed_max() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.db_min_connections = 20;
        cfg.db_max_connections = 4;
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn file_layer_overrides_builtin_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
                database_url = "sqlite::memory:"
                environment = "development"
                alert_workers = 5
                alert_queue_capacity = 8
                db_lock_timeout_ms = 250
            "#,
        )
        .unwrap();

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.alert_workers, 5);
        assert_eq!(cfg.alert_queue_capacity, 8);
        assert_eq!(cfg.lock_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.port, DEFAULT_PORT);
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
                environment = "development"
                log_level = "chatty"
            "#,
        )
        .unwrap();

        let result = load_config_from(dir.path());
        assert!(matches!(result, Err(AppConfigError::Validation(_))));
    }
}
