//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BAZAAR_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `BAZAAR_PRODUCT_CACHE_TTL_SECS` - Product detail cache TTL (default: 300)
//! - `BAZAAR_PRODUCT_LIST_CACHE_TTL_SECS` - Product list page cache TTL (default: 120)
//! - `BAZAAR_CACHE_CAPACITY` - Max entries per cache (default: 1000)
//! - `BAZAAR_NOTIFY_MAX_ATTEMPTS` - Delivery attempts per notification (default: 3)
//! - `BAZAAR_NOTIFY_RETRY_BASE_MS` - First retry delay, doubled per attempt (default: 500)
//! - `BAZAAR_NOTIFY_QUEUE_CAPACITY` - Pending notification queue size (default: 1024)
//! - `SMTP_HOST` - SMTP relay; when unset, emails are written to the log
//! - `SMTP_PORT` - SMTP port (default: 587)
//! - `SMTP_USERNAME` / `SMTP_PASSWORD` - SMTP credentials (required with `SMTP_HOST`)
//! - `SMTP_FROM` - Sender address (default: no-reply@bazaar.local)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `LOG_FORMAT` - `json` for JSON logs, anything else for human-readable

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Product catalog cache settings
    pub cache: CacheConfig,
    /// Notification queue and retry settings
    pub notifications: NotificationConfig,
    /// SMTP settings; `None` logs emails instead of sending them
    pub email: Option<EmailConfig>,
    /// Logging and error tracking settings
    pub telemetry: TelemetryConfig,
}

/// Product catalog cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL for single product entries
    pub product_ttl: Duration,
    /// TTL for product list pages
    pub list_ttl: Duration,
    /// Max entries per cache
    pub capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            product_ttl: Duration::from_secs(300),
            list_ttl: Duration::from_secs(120),
            capacity: 1000,
        }
    }
}

/// Notification dispatch configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Delivery attempts before a notification is given up on (at least 1)
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry
    pub retry_base_delay: Duration,
    /// Bounded queue size; notifications beyond it are dropped
    pub queue_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            queue_capacity: 1024,
        }
    }
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Logging and Sentry configuration.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production")
    pub sentry_environment: Option<String>,
    /// Emit JSON log lines
    pub json_logs: bool,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: get_database_url("BAZAAR_DATABASE_URL")?,
            cache: CacheConfig::from_env()?,
            notifications: NotificationConfig::from_env()?,
            email: EmailConfig::from_env()?,
            telemetry: TelemetryConfig::from_env(),
        })
    }
}

impl CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            product_ttl: Duration::from_secs(parse_env_or(
                "BAZAAR_PRODUCT_CACHE_TTL_SECS",
                defaults.product_ttl.as_secs(),
            )?),
            list_ttl: Duration::from_secs(parse_env_or(
                "BAZAAR_PRODUCT_LIST_CACHE_TTL_SECS",
                defaults.list_ttl.as_secs(),
            )?),
            capacity: parse_env_or("BAZAAR_CACHE_CAPACITY", defaults.capacity)?,
        })
    }
}

impl NotificationConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_attempts = parse_env_or("BAZAAR_NOTIFY_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BAZAAR_NOTIFY_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        #[allow(clippy::cast_possible_truncation)] // Default fits comfortably in u64
        let base_ms = parse_env_or(
            "BAZAAR_NOTIFY_RETRY_BASE_MS",
            defaults.retry_base_delay.as_millis() as u64,
        )?;
        Ok(Self {
            max_attempts,
            retry_base_delay: Duration::from_millis(base_ms),
            queue_capacity: parse_env_or("BAZAAR_NOTIFY_QUEUE_CAPACITY", defaults.queue_capacity)?,
        })
    }
}

impl EmailConfig {
    /// SMTP is optional: without `SMTP_HOST` no email config is built.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };
        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_env_or("SMTP_PORT", 587)?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: SecretString::from(get_required_env("SMTP_PASSWORD")?),
            from_address: get_env_or_default("SMTP_FROM", "no-reply@bazaar.local"),
        }))
    }
}

impl TelemetryConfig {
    fn from_env() -> Self {
        Self {
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            json_logs: get_optional_env("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
pub fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional, non-empty environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an optional environment variable, falling back to `default`.
fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| parse_value(key, &raw))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
