use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_FREE_SHIPPING_THRESHOLD: u64 = 500;
const DEFAULT_FLAT_SHIPPING_FEE: u64 = 50;
const DEFAULT_GATEWAY_SUCCESS_RATE: f64 = 0.95;
const DEFAULT_GATEWAY_DELAY_MS: u64 = 250;
const DEFAULT_PAYMENT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

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
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to create the database schema on startup (dev/test convenience)
    #[serde(default)]
    pub auto_create_schema: bool,

    /// CORS: allow any origin (development fallback)
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Order total at or above which shipping is free
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: u64,

    /// Flat shipping fee charged below the free-shipping threshold
    #[serde(default = "default_flat_shipping_fee")]
    pub flat_shipping_fee: u64,

    /// Simulated gateway approval probability (0.0 - 1.0)
    #[serde(default = "default_gateway_success_rate")]
    #[validate(custom = "validate_success_rate")]
    pub gateway_success_rate: f64,

    /// Artificial processing delay applied by the simulated gateway
    #[serde(default = "default_gateway_delay_ms")]
    pub gateway_delay_ms: u64,

    /// Upper bound on a single gateway call; elapsing counts as a decline
    #[serde(default = "default_payment_timeout_secs")]
    pub payment_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl AppConfig {
    /// Gets the socket address string for the HTTP server
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Gets the log level
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            auto_create_schema: false,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            free_shipping_threshold: DEFAULT_FREE_SHIPPING_THRESHOLD,
            flat_shipping_fee: DEFAULT_FLAT_SHIPPING_FEE,
            gateway_success_rate: DEFAULT_GATEWAY_SUCCESS_RATE,
            gateway_delay_ms: DEFAULT_GATEWAY_DELAY_MS,
            payment_timeout_secs: DEFAULT_PAYMENT_TIMEOUT_SECS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            request_timeout_secs: default_request_timeout_secs(),
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

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_free_shipping_threshold() -> u64 {
    DEFAULT_FREE_SHIPPING_THRESHOLD
}

fn default_flat_shipping_fee() -> u64 {
    DEFAULT_FLAT_SHIPPING_FEE
}

fn default_gateway_success_rate() -> f64 {
    DEFAULT_GATEWAY_SUCCESS_RATE
}

fn default_gateway_delay_ms() -> u64 {
    DEFAULT_GATEWAY_DELAY_MS
}

fn default_payment_timeout_secs() -> u64 {
    DEFAULT_PAYMENT_TIMEOUT_SECS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn validate_success_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || rate < 0.0 || rate > 1.0 {
        let mut err = ValidationError::new("gateway_success_rate");
        err.message =
            Some("gateway_success_rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

/// Loads configuration from files and environment variables.
///
/// Sources are layered: built-in defaults, `config/default.toml`,
/// `config/{RUN_ENV}.toml`, then `APP_*` environment variables.
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

    let config = Config::builder()
        .set_default("database_url", "sqlite://marketplace.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;

    Ok(app_config)
}

/// Initializes the tracing subscriber.
///
/// Respects `RUST_LOG` when set; otherwise scopes the configured level to this
/// crate and tower_http.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("marketplace_api={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.free_shipping_threshold, 500);
        assert_eq!(cfg.flat_shipping_fee, 50);
        assert!((cfg.gateway_success_rate - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn success_rate_bounds_are_enforced() {
        let mut cfg = AppConfig::default();
        cfg.gateway_success_rate = 1.2;
        assert!(cfg.validate().is_err());
        cfg.gateway_success_rate = -0.1;
        assert!(cfg.validate().is_err());
        cfg.gateway_success_rate = 0.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn server_addr_joins_host_and_port() {
        let cfg = AppConfig {
            host: "0.0.0.0".to_string(),
            port: 9090,
            ..AppConfig::default()
        };
        assert_eq!(cfg.server_addr(), "0.0.0.0:9090");
    }
}
