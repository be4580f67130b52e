use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "ILS";
const DEFAULT_REDIRECT_BASE: &str = "http://localhost:5173";
const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 20;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL. Both `postgres://` and `sqlite://` URLs are
    /// supported; the storage engine is selected here and nowhere else.
    pub database_url: String,

    /// Redis connection URL (webhook replay dedup)
    pub redis_url: String,

    /// JWT secret key used to verify bearer tokens
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: usize,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment ("development", "production", ...)
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Currency code stamped on orders
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Base URL the checkout redirect handle points at
    #[serde(default = "default_redirect_base")]
    pub checkout_redirect_base: String,

    /// Shared secret for payment webhook signature verification.
    /// When unset, signatures are not checked (development only).
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Allowed clock skew for signed webhook timestamps, in seconds
    #[serde(default)]
    pub payment_webhook_tolerance_secs: Option<u64>,

    /// Comma-separated list of allowed CORS origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Checkout rate limit: allowed requests per window
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests_per_window: u32,

    /// Checkout rate limit: window length in seconds
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_seconds: u64,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling.
    pub fn new(
        database_url: impl Into<String>,
        redis_url: impl Into<String>,
        jwt_secret: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            redis_url: redis_url.into(),
            jwt_secret: jwt_secret.into(),
            jwt_expiration: default_jwt_expiration(),
            host: host.into(),
            port,
            environment: environment.into(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            currency: default_currency(),
            checkout_redirect_base: default_redirect_base(),
            payment_webhook_secret: None,
            payment_webhook_tolerance_secs: None,
            cors_allowed_origins: None,
            rate_limit_requests_per_window: default_rate_limit_requests(),
            rate_limit_window_seconds: default_rate_limit_window_secs(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("dev")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Webhook timestamp tolerance, defaulting to five minutes.
    pub fn webhook_tolerance_secs(&self) -> i64 {
        self.payment_webhook_tolerance_secs
            .map(|t| t as i64)
            .unwrap_or(300)
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

fn default_jwt_expiration() -> usize {
    3600
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_redirect_base() -> String {
    DEFAULT_REDIRECT_BASE.to_string()
}
fn default_rate_limit_requests() -> u32 {
    DEFAULT_RATE_LIMIT_REQUESTS
}
fn default_rate_limit_window_secs() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}
fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}

/// Initializes tracing using the provided log level as the default filter.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("subflow_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. `config/default.toml` and `config/{env}.toml` (both optional)
/// 3. Environment variables (`APP__*`)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // jwt_secret deliberately has no default; it must come from the
    // environment or a config file.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://subflow.db?mode=rwc")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to a secure random string (minimum 32 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET.".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
