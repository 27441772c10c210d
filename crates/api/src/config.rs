use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Payment processor settings. Payments are disabled without a secret key.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub api_base: String,
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub currency: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host to bind to.
    pub host: String,
    /// Server port to bind to.
    pub port: u16,
    /// PostgreSQL connection URL. Records are kept in memory when unset.
    pub database_url: Option<String>,
    /// Maximum database connections in the pool.
    pub db_max_connections: u32,
    /// Minimum database connections in the pool.
    pub db_min_connections: u32,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Admin token lifetime.
    pub jwt_ttl_secs: i64,
    pub admin_username: String,
    /// Argon2 PHC string for the admin password. Login is refused when unset.
    pub admin_password_hash: Option<String>,
    /// Event bus channel capacity.
    pub event_bus_capacity: usize,
    /// Log level (e.g., "info", "debug", "trace").
    pub log_level: String,
    /// Directory uploaded images are written to and served from.
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Allowed CORS origins; empty means any.
    pub cors_origins: Vec<String>,
    pub payments: PaymentConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            database_url: None,
            db_max_connections: 20,
            db_min_connections: 5,
            jwt_secret: "dev-secret-change-me-in-production".to_string(),
            jwt_ttl_secs: 24 * 60 * 60,
            admin_username: "admin".to_string(),
            admin_password_hash: None,
            event_bus_capacity: 1024,
            log_level: "info".to_string(),
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 5 * 1024 * 1024,
            cors_origins: Vec::new(),
            payments: PaymentConfig {
                api_base: "https://api.stripe.com/v1".to_string(),
                secret_key: None,
                webhook_secret: None,
                currency: "usd".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT", "u16", defaults.port)?,
            database_url: optional_var("DATABASE_URL"),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "u32", defaults.db_max_connections)?,
            db_min_connections: parse_var("DB_MIN_CONNECTIONS", "u32", defaults.db_min_connections)?,
            jwt_secret: env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            jwt_ttl_secs: parse_var("JWT_TTL_SECS", "i64", defaults.jwt_ttl_secs)?,
            admin_username: env::var("ADMIN_USERNAME").unwrap_or(defaults.admin_username),
            admin_password_hash: optional_var("ADMIN_PASSWORD_HASH"),
            event_bus_capacity: parse_var("EVENT_BUS_CAPACITY", "usize", defaults.event_bus_capacity)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            upload_dir: optional_var("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", "usize", defaults.max_upload_bytes)?,
            cors_origins: optional_var("CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            payments: PaymentConfig {
                api_base: env::var("PAYMENT_API_BASE").unwrap_or(defaults.payments.api_base),
                secret_key: optional_var("PAYMENT_SECRET_KEY"),
                webhook_secret: optional_var("PAYMENT_WEBHOOK_SECRET"),
                currency: env::var("PAYMENT_CURRENCY").unwrap_or(defaults.payments.currency),
            },
        })
    }

    /// Build the socket address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, expected, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_without_database() {
        let config = AppConfig::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.addr(), "0.0.0.0:5000");
    }

    #[test]
    fn bad_number_is_reported() {
        let err = parse_var::<u16>("CHURCH_API_TEST_UNSET_PORT", "u16", 1).map(|port| port + 1);
        assert_eq!(err.unwrap(), 2);
        let err = "not-a-port".parse::<u16>().map_err(|_| ConfigError::Invalid {
            key: "PORT",
            expected: "u16",
            value: "not-a-port".into(),
        });
        assert_eq!(err.unwrap_err().to_string(), "PORT must be a valid u16, got \"not-a-port\"");
    }
}
