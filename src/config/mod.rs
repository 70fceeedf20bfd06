//! Configuration management for the ledger core
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

/// Ledger configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Current environment
    pub environment: Environment,

    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Deadline for a single record store call in milliseconds (default: 3000)
    pub store_timeout_ms: u64,

    /// bcrypt work factor for password hashes
    pub bcrypt_cost: u32,

    /// Activation token TTL in hours (default: 72)
    pub activation_token_ttl_hours: i64,

    /// Pending notifications kept before new ones are dropped
    pub notification_queue_capacity: usize,

    /// Log level (RUST_LOG)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            database_url: String::new(),
            db_max_connections: 5,
            store_timeout_ms: 3000,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            activation_token_ttl_hours: 72,
            notification_queue_capacity: 256,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::from_str(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", defaults.db_max_connections);
        let store_timeout_ms = parse_or("STORE_TIMEOUT_MS", defaults.store_timeout_ms);

        let bcrypt_cost = parse_or("BCRYPT_COST", defaults.bcrypt_cost);
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "BCRYPT_COST must be between 4 and 31, got {}",
                bcrypt_cost
            )));
        }

        let activation_token_ttl_hours =
            parse_or("ACTIVATION_TOKEN_TTL_HOURS", defaults.activation_token_ttl_hours);

        let notification_queue_capacity =
            parse_or("NOTIFICATION_QUEUE_CAPACITY", defaults.notification_queue_capacity);

        let log_level = env::var("RUST_LOG").unwrap_or(defaults.log_level);

        Ok(Config {
            environment,
            database_url,
            db_max_connections,
            store_timeout_ms,
            bcrypt_cost,
            activation_token_ttl_hours,
            notification_queue_capacity,
            log_level,
        })
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn activation_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.activation_token_ttl_hours)
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> String {
        // Mask password in database URL for logging
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
