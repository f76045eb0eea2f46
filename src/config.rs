use config::{Config, ConfigError, Environment, File};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com";
const DEFAULT_GRAPH_API_VERSION: &str = "v20.0";
const DEFAULT_EXPORT_DIR: &str = "var/export/meta";
const DEFAULT_ORDER_STATUS: &str = "pending";
const DEFAULT_CURRENCY: &str = "USD";
const MIN_SECRET_LENGTH: usize = 32;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
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

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Upper bound for a single inbound request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// Fallback Meta API key used when no store level key has been persisted
    #[serde(default)]
    pub api_key: Option<String>,

    /// Shared secret for request body signatures sent by Meta
    #[serde(default)]
    pub signature_secret: Option<String>,

    /// Accepted clock skew for signed requests
    #[serde(default = "default_signature_tolerance_secs")]
    pub signature_tolerance_secs: u64,

    /// Bearer token guarding the admin endpoints
    #[serde(default)]
    pub admin_token: Option<String>,

    #[serde(default = "default_graph_base_url")]
    #[validate(custom = "validate_graph_base_url")]
    pub graph_base_url: String,

    #[serde(default = "default_graph_api_version")]
    #[validate(custom = "validate_graph_api_version")]
    pub graph_api_version: String,

    #[serde(default = "default_graph_timeout_secs")]
    pub graph_timeout_secs: u64,

    /// Log Graph API request parameters and response bodies
    #[serde(default)]
    pub graph_debug: bool,

    /// Directory receiving generated feed files before upload
    #[serde(default = "default_export_dir")]
    pub export_dir: String,

    /// Status of orders created through the checkout API unless the store overrides it
    #[serde(default = "default_order_status")]
    #[validate(custom = "validate_order_status")]
    pub default_order_status: String,

    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub default_currency: String,

    /// Fallback tax rate as a fraction (0.0825 = 8.25%)
    #[serde(default)]
    #[validate(custom = "validate_tax_rate")]
    pub default_tax_rate: f64,

    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Creates a new configuration with defaults for every optional setting
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            api_key: None,
            signature_secret: None,
            signature_tolerance_secs: default_signature_tolerance_secs(),
            admin_token: None,
            graph_base_url: default_graph_base_url(),
            graph_api_version: default_graph_api_version(),
            graph_timeout_secs: default_graph_timeout_secs(),
            graph_debug: false,
            export_dir: default_export_dir(),
            default_order_status: default_order_status(),
            default_currency: default_currency(),
            default_tax_rate: 0.0,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        matches!(
            self.environment.to_ascii_lowercase().as_str(),
            "development" | "dev" | "test" | "local"
        )
    }

    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|origins| origins.split(',').any(|o| !o.trim().is_empty()))
            .unwrap_or(false)
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() {
            if let Err(err) = validate_secret("signature_secret", self.signature_secret.as_deref())
            {
                errors.add("signature_secret", err);
            }
            if let Err(err) = validate_secret("admin_token", self.admin_token.as_deref()) {
                errors.add("admin_token", err);
            }
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

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
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
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_signature_tolerance_secs() -> u64 {
    300
}
fn default_graph_base_url() -> String {
    DEFAULT_GRAPH_BASE_URL.to_string()
}
fn default_graph_api_version() -> String {
    DEFAULT_GRAPH_API_VERSION.to_string()
}
fn default_graph_timeout_secs() -> u64 {
    30
}
fn default_export_dir() -> String {
    DEFAULT_EXPORT_DIR.to_string()
}
fn default_order_status() -> String {
    DEFAULT_ORDER_STATUS.to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_event_channel_capacity() -> usize {
    1024
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

fn validate_order_status(status: &str) -> Result<(), ValidationError> {
    match status {
        "pending" | "processing" => Ok(()),
        _ => {
            let mut err = ValidationError::new("default_order_status");
            err.message = Some("Must be one of: pending, processing".into());
            Err(err)
        }
    }
}

fn validate_graph_base_url(value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => {
            let mut err = ValidationError::new("graph_base_url");
            err.message = Some("graph_base_url must be an absolute http(s) URL".into());
            Err(err)
        }
    }
}

static GRAPH_API_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v\d+\.\d+$").unwrap());

fn validate_graph_api_version(version: &str) -> Result<(), ValidationError> {
    if GRAPH_API_VERSION.is_match(version) {
        return Ok(());
    }
    let mut err = ValidationError::new("graph_api_version");
    err.message = Some("graph_api_version must look like v20.0".into());
    Err(err)
}

fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
        let mut err = ValidationError::new("default_tax_rate");
        err.message = Some("default_tax_rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_secret(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    let trimmed = value.map(str::trim).unwrap_or_default();
    if trimmed.len() < MIN_SECRET_LENGTH {
        let mut err = ValidationError::new(field);
        err.message = Some(
            format!(
                "{} must be set to at least {} characters outside development",
                field, MIN_SECRET_LENGTH
            )
            .into(),
        );
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new(field);
            err.message = Some(format!("{} cannot be a repeated character sequence", field).into());
            return Err(err);
        }
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("meta_commerce_bridge={},tower_http=debug", level);
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
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(CONFIG_DIR)
}

pub fn load_config_from(config_dir: &str) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(config_dir).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://meta_bridge.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
        .add_source(File::with_name(&format!("{}/{}", config_dir, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
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
    fn production_requires_secrets_and_cors() {
        let cfg = base_config();
        let errors = cfg.validate_additional_constraints().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("cors_allowed_origins"));
        assert!(fields.contains_key("signature_secret"));
        assert!(fields.contains_key("admin_token"));
    }

    #[test]
    fn production_with_secrets_and_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://business.facebook.com".into());
        cfg.signature_secret = Some("a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8".into());
        cfg.admin_token = Some("Zq7yT2mLr8Xk4Wb9Pn1Vc6Hs3Jd5Gf0Ae".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn repeated_character_secret_is_rejected() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.signature_secret = Some("x".repeat(40));
        cfg.admin_token = Some("Zq7yT2mLr8Xk4Wb9Pn1Vc6Hs3Jd5Gf0Ae".into());
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.field_errors().contains_key("signature_secret"));
    }

    #[test]
    fn development_skips_secret_checks() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn field_validation_rejects_bad_values() {
        let mut cfg = base_config();
        cfg.log_level = "loud".into();
        cfg.default_order_status = "complete".into();
        cfg.default_tax_rate = 1.5;
        cfg.graph_base_url = "graph.facebook.com".into();
        cfg.graph_api_version = "20".into();

        let errors = cfg.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("log_level"));
        assert!(fields.contains_key("default_order_status"));
        assert!(fields.contains_key("default_tax_rate"));
        assert!(fields.contains_key("graph_base_url"));
        assert!(fields.contains_key("graph_api_version"));
    }

    #[test]
    fn loads_layered_file_configuration() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join("config");
        std::fs::create_dir(&config_dir).unwrap();
        let mut file = std::fs::File::create(config_dir.join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
            database_url = "sqlite::memory:"
            graph_api_version = "v19.0"
            default_order_status = "processing"
            export_dir = "/tmp/meta-export"
            "#
        )
        .unwrap();

        let cfg = load_config_from(config_dir.to_str().unwrap()).unwrap();
        assert_eq!(cfg.graph_api_version, "v19.0");
        assert_eq!(cfg.default_order_status, "processing");
        assert_eq!(cfg.export_dir, "/tmp/meta-export");
        assert_eq!(cfg.graph_base_url, DEFAULT_GRAPH_BASE_URL);
    }
}
