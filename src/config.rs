use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;
use validator::{Validate, ValidationError};

use crate::errors::ServiceError;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HOLD_DURATION_SECS: u64 = 600;
const DEFAULT_MIN_AMOUNT_MINOR: i64 = 100;
const DEFAULT_CURRENCY: &str = "INR";

fn validate_base_url(value: &str) -> Result<(), ValidationError> {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        _ => {
            let mut err = ValidationError::new("url");
            err.message = Some("api_base_url must be an absolute http(s) URL".into());
            Err(err)
        }
    }
}

fn validate_currency(currency: &str) -> Result<(), ValidationError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("Currency must be a 3-letter ISO code".into());
        Err(err)
    }
}

/// Payment gateway configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// URL of the hosted payment widget script
    pub script_url: String,

    /// Publishable merchant key; the backend-issued intent carries the
    /// authoritative key, this is only a fallback for widget bootstrap
    #[serde(default)]
    pub key_id: Option<String>,

    /// Settlement currency (3-letter ISO code)
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3), custom = "validate_currency")]
    pub currency: String,

    /// Smallest payable amount, in minor currency units
    #[serde(default = "default_min_amount_minor")]
    pub min_amount_minor: i64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            script_url: "https://checkout.razorpay.com/v1/checkout.js".to_string(),
            key_id: None,
            currency: default_currency(),
            min_amount_minor: default_min_amount_minor(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base URL of the marketplace REST API
    #[validate(custom = "validate_base_url")]
    pub api_base_url: String,

    /// Bearer token attached to every API request
    #[serde(default)]
    pub api_token: Option<String>,

    /// Per-request timeout for backend calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Payment gateway settings
    #[serde(default)]
    #[validate]
    pub gateway: GatewayConfig,

    /// How long a payment-failed order is held open for retry
    #[serde(default = "default_hold_duration_secs")]
    pub hold_duration_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Runtime environment name
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            gateway: GatewayConfig::default(),
            hold_duration_secs: default_hold_duration_secs(),
            log_level: default_log_level(),
            environment: default_environment(),
        }
    }
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn hold_duration(&self) -> Duration {
        Duration::from_secs(self.hold_duration_secs)
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_hold_duration_secs() -> u64 {
    DEFAULT_HOLD_DURATION_SECS
}

fn default_min_amount_minor() -> i64 {
    DEFAULT_MIN_AMOUNT_MINOR
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// Loads configuration from `config/default`, `config/<RUN_ENV>` (both
/// optional) and `CHECKOUT__`-prefixed environment variables, then validates
/// the result.
pub fn load_config() -> Result<AppConfig, ServiceError> {
    let environment = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg = Config::builder()
        .add_source(File::from(Path::new(CONFIG_DIR).join("default")).required(false))
        .add_source(File::from(Path::new(CONFIG_DIR).join(&environment)).required(false))
        .add_source(Environment::with_prefix("CHECKOUT").separator("__"))
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    app_config.validate()?;

    Ok(app_config)
}
