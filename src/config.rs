use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_PROVIDER_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_SHIPPING_COUNTRIES: &str = "US,CA";

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

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback outside development
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
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Payment provider secret API key
    pub stripe_secret_key: String,

    /// Payment provider API base URL (overridable for tests)
    #[serde(default = "default_provider_api_base")]
    pub stripe_api_base: String,

    /// Shared secret for verifying inbound webhook signatures
    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,

    /// Webhook signature timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub stripe_webhook_tolerance_secs: u64,

    /// Public site URL used to build success/cancel redirect URLs
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Comma-separated ISO country codes allowed for shipping collection
    #[serde(default = "default_shipping_countries")]
    #[validate(custom = "validate_shipping_countries")]
    pub shipping_allowed_countries: String,

    /// Default currency code for checkout sessions
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Static bearer token gating the order-listing endpoint. When unset,
    /// the endpoint is open in development and refused elsewhere.
    #[serde(default)]
    pub admin_api_token: Option<String>,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Shipping countries as a cleaned-up list
    pub fn shipping_countries(&self) -> Vec<String> {
        self.shipping_allowed_countries
            .split(',')
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Success-page URL template; the provider substitutes the session id.
    pub fn checkout_success_url(&self) -> String {
        format!(
            "{}/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.site_url.trim_end_matches('/')
        )
    }

    /// Cancel redirect back to the buy page.
    pub fn checkout_cancel_url(&self) -> String {
        format!("{}/buy?canceled=true", self.site_url.trim_end_matches('/'))
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

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
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

fn default_provider_api_base() -> String {
    DEFAULT_PROVIDER_API_BASE.to_string()
}

fn default_webhook_tolerance_secs() -> u64 {
    300
}

fn default_site_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_shipping_countries() -> String {
    DEFAULT_SHIPPING_COUNTRIES.to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn validate_shipping_countries(value: &str) -> Result<(), ValidationError> {
    let any_valid = value
        .split(',')
        .map(str::trim)
        .any(|c| c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()));
    if any_valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("shipping_allowed_countries");
        err.message = Some("Must be a comma-separated list of 2-letter country codes".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
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

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
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

    // NOTE: stripe_secret_key has no default - it MUST be provided via
    // environment variable or config file.
    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("stripe_secret_key").is_err() {
        error!("Payment provider key is not configured. Set APP__STRIPE_SECRET_KEY.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "stripe_secret_key is required but not configured. Set APP__STRIPE_SECRET_KEY environment variable."
                .into(),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 8080,
            environment: "development".into(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            stripe_secret_key: "sk_test_key".into(),
            stripe_api_base: default_provider_api_base(),
            stripe_webhook_secret: Some("whsec_test".into()),
            stripe_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            site_url: "https://shop.example.com".into(),
            shipping_allowed_countries: default_shipping_countries(),
            default_currency: default_currency(),
            admin_api_token: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    #[test]
    fn success_url_carries_session_placeholder() {
        let cfg = base_config();
        assert_eq!(
            cfg.checkout_success_url(),
            "https://shop.example.com/success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(
            cfg.checkout_cancel_url(),
            "https://shop.example.com/buy?canceled=true"
        );
    }

    #[test]
    fn shipping_countries_are_normalized() {
        let mut cfg = base_config();
        cfg.shipping_allowed_countries = " us, ca ,".into();
        assert_eq!(cfg.shipping_countries(), vec!["US", "CA"]);
    }

    #[test]
    fn invalid_shipping_countries_fail_validation() {
        let mut cfg = base_config();
        cfg.shipping_allowed_countries = "United States".into();
        assert!(cfg.validate().is_err());
    }
}
