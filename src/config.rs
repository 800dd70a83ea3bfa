use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::retry::RetryPolicy;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// External payment processor configuration.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct PaymentConfig {
    /// API secret key used for intent creation
    #[validate(length(min = 1))]
    pub secret_key: String,

    /// Base URL of the processor API
    #[serde(default = "default_payment_api_base")]
    pub api_base: String,

    /// Shared secret for completion-event signature verification
    #[validate(length(min = 1))]
    pub webhook_secret: String,

    /// Allowed clock skew between the event timestamp and now
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: u64,

    /// Timeout applied to every processor call
    #[serde(default = "default_http_timeout")]
    pub request_timeout_secs: u64,

    /// Charge currency (ISO 4217, lowercase)
    #[serde(default = "default_currency")]
    pub currency: String,
}

/// SMTP settings for receipt email delivery.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    pub username: String,
    pub password: String,

    /// From address on outgoing receipt mail
    pub from_address: String,

    /// Disable to skip email dispatch entirely (e.g. local development)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Carrier rate-quote collaborator plus the fixed origin/parcel we quote for.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ShippingConfig {
    #[validate(length(min = 1))]
    pub api_key: String,

    #[serde(default = "default_shipping_api_base")]
    pub api_base: String,

    #[serde(default = "default_http_timeout")]
    pub request_timeout_secs: u64,

    pub origin_name: String,
    pub origin_line1: String,
    pub origin_city: String,
    pub origin_state: String,
    pub origin_postal_code: String,
    pub origin_country: String,
    #[serde(default)]
    pub origin_phone: String,

    /// Parcel dimensions in inches
    pub parcel_length: f64,
    pub parcel_width: f64,
    pub parcel_height: f64,
    /// Parcel weight in ounces
    pub parcel_weight_oz: f64,
}

/// Knobs for one [`RetryPolicy`].
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_retry_multiplier")]
    pub multiplier: u32,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: std::time::Duration::from_millis(self.initial_delay_ms),
            max_delay: std::time::Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

fn default_poller_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        initial_delay_ms: 1000,
        max_delay_ms: 1000,
        multiplier: 1,
    }
}

fn default_store_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 200,
        max_delay_ms: 2000,
        multiplier: 2,
    }
}

fn default_email_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 500,
        max_delay_ms: 5000,
        multiplier: 2,
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to create missing tables on startup
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout in seconds
    #[serde(default = "default_db_connect_timeout")]
    pub db_connect_timeout_secs: u64,

    /// DB acquire timeout in seconds
    #[serde(default = "default_db_acquire_timeout")]
    pub db_acquire_timeout_secs: u64,

    /// DB idle timeout in seconds
    #[serde(default = "default_db_idle_timeout")]
    pub db_idle_timeout_secs: u64,

    /// Sales tax rate applied per cart line (e.g. 0.0725)
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,

    #[validate]
    pub payment: PaymentConfig,

    #[validate]
    pub smtp: SmtpConfig,

    #[validate]
    pub shipping: ShippingConfig,

    /// Reconciliation poller retry budget
    #[serde(default = "default_poller_retry")]
    pub poller_retry: RetryConfig,

    /// Store-retry budget used during materialization
    #[serde(default = "default_store_retry")]
    pub store_retry: RetryConfig,

    /// Receipt email dispatch retry budget
    #[serde(default = "default_email_retry")]
    pub email_retry: RetryConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_true() -> bool {
    true
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout() -> u64 {
    30
}
fn default_db_acquire_timeout() -> u64 {
    8
}
fn default_db_idle_timeout() -> u64 {
    600
}
fn default_tax_rate() -> Decimal {
    Decimal::new(725, 4) // 7.25%
}
fn default_payment_api_base() -> String {
    "https://api.stripe.com/v1".to_string()
}
fn default_shipping_api_base() -> String {
    "https://api.easypost.com/v2".to_string()
}
fn default_webhook_tolerance() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_retry_max_delay_ms() -> u64 {
    5000
}
fn default_retry_multiplier() -> u32 {
    2
}

/// The snapshot codec carries tax rates at exactly four decimal places; a
/// finer rate would be rounded in transit and then fail reconciliation on
/// every completion event.
fn tax_rate_is_carriable(rate: &Decimal) -> bool {
    rate.normalize().scale() <= 4
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case(DEFAULT_ENV)
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Loads configuration from `config/default`, `config/{environment}` and
/// `APP__`-prefixed environment variables (later sources win).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment =
        std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_file = Path::new(CONFIG_DIR).join("default");
    if let Some(path) = default_file.to_str() {
        builder = builder.add_source(File::with_name(path).required(false));
    }
    let env_file = Path::new(CONFIG_DIR).join(&environment);
    if let Some(path) = env_file.to_str() {
        builder = builder.add_source(File::with_name(path).required(false));
    }

    builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;
    if !tax_rate_is_carriable(&cfg.tax_rate) {
        return Err(ConfigError::Message(format!(
            "tax_rate {} carries more than four decimal places",
            cfg.tax_rate
        )));
    }
    Ok(cfg)
}

/// Installs the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
