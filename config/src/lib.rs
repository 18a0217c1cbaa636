//! # Configuration Management for QueryHaus
//!
//! This crate provides centralized configuration structures for all QueryHaus components,
//! including the SQL Server connection, query cache, connection retry and metrics settings.
//!
//! ## Quick Start
//!
//! ### Programmatic Configuration
//! ```rust
//! use config::{CacheConfig, DatabaseConfig};
//!
//! let db_config = DatabaseConfig::new(
//!     "localhost".to_string(), 1433, "dashboard".to_string(),
//!     "app_user".to_string(), "password".to_string(),
//!     1, 10, 60, 30,
//! );
//!
//! let cache_config = CacheConfig::new(300, 60);
//! ```
//!
//! ### TOML File Configuration
//! ```toml
//! [database]
//! host = "localhost"
//! port = 1433
//! database = "dashboard"
//! username = "app_user"
//! password = "password"
//! encrypt = true
//! trust_server_certificate = true
//! min_connections = 1
//! max_connections = 10
//! connection_timeout_seconds = 60
//! request_timeout_seconds = 30
//!
//! [cache]
//! default_ttl_seconds = 300
//! sweep_interval_seconds = 60
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//! max_delay_ms = 5000
//!
//! [metrics]
//! capacity = 1000
//! slow_threshold_ms = 1000
//! ```
//!
//! Load configuration:
//! ```rust,no_run
//! use config::AppConfig;
//!
//! // Load from QUERYHAUS_CONFIG or ./queryhaus.toml
//! let config = AppConfig::load()?;
//!
//! // Or load from custom path
//! let config = AppConfig::from_file("config/production.toml")?;
//! # Ok::<(), config::ConfigError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{env, path::Path};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "./queryhaus.toml";
const CONFIG_PATH_VAR: &str = "QUERYHAUS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Environment variable error: {0}")]
    Env(#[from] env::VarError),
    #[error("Dotenvy error: {0}")]
    Dotenvy(#[from] dotenvy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub metrics: MetricsConfig,
}

/// SQL Server connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    pub min_connections: u32,
    pub max_connections: u32,
    pub connection_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

/// In-memory query cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when a caller does not pass one
    pub default_ttl_seconds: u64,
    /// Period of the background purge of expired entries
    pub sweep_interval_seconds: u64,
}

/// Connection retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Performance metric collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Ring buffer capacity
    pub capacity: usize,
    pub slow_threshold_ms: u64,
}

impl AppConfig {
    /// Load configuration from the TOML file named in the environment (or `.env`),
    /// falling back to `./queryhaus.toml`
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e.into());
            }
        }

        let config = if let Ok(config_path) = env::var(CONFIG_PATH_VAR) {
            Self::from_file(&config_path)
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::from_file(DEFAULT_CONFIG_PATH)
        } else {
            Err(ConfigError::Invalid(format!(
                "Config path must be specified in .env file as {} or in {} file",
                CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH
            )))
        }?;

        Ok(config)
    }

    /// Build configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e.into());
            }
        }

        let config = Self {
            database: DatabaseConfig::from_env()?,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Database validations
        if self.database.host.is_empty() {
            return Err(ConfigError::Invalid(
                "Database host cannot be empty".to_string(),
            ));
        }
        if self.database.port == 0 {
            return Err(ConfigError::Invalid(
                "Database port cannot be zero".to_string(),
            ));
        }
        if self.database.database.is_empty() {
            return Err(ConfigError::Invalid(
                "Database name cannot be empty".to_string(),
            ));
        }
        if self.database.username.is_empty() {
            return Err(ConfigError::Invalid(
                "Database username cannot be empty".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(
                "Database min_connections cannot be greater than max_connections".to_string(),
            ));
        }
        if self.database.connection_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Database connection_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.database.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Database request_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        // Cache validations
        if self.cache.default_ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Cache default_ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if self.cache.sweep_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Cache sweep_interval_seconds must be greater than 0".to_string(),
            ));
        }

        // Retry validations
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "Retry max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "Retry base_delay_ms cannot be greater than max_delay_ms".to_string(),
            ));
        }

        // Metrics validations
        if self.metrics.capacity == 0 {
            return Err(ConfigError::Invalid(
                "Metrics capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// Create a new database configuration
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
        min_connections: u32,
        max_connections: u32,
        connection_timeout_seconds: u64,
        request_timeout_seconds: u64,
    ) -> Self {
        Self {
            host,
            port,
            database,
            username,
            password,
            min_connections,
            max_connections,
            connection_timeout_seconds,
            request_timeout_seconds,
            ..Self::default()
        }
    }

    /// Read connection settings from `DB_*` environment variables.
    ///
    /// Unset variables keep their defaults. There is no default password.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            host: env::var("DB_SERVER").unwrap_or(defaults.host),
            port: parse_env("DB_PORT", defaults.port)?,
            database: env::var("DB_DATABASE").unwrap_or(defaults.database),
            username: env::var("DB_USER").unwrap_or(defaults.username),
            password: env::var("DB_PASSWORD").unwrap_or(defaults.password),
            encrypt: parse_env("DB_ENCRYPT", defaults.encrypt)?,
            trust_server_certificate: parse_env(
                "DB_TRUST_SERVER_CERTIFICATE",
                defaults.trust_server_certificate,
            )?,
            min_connections: parse_env("DB_POOL_MIN", defaults.min_connections)?,
            max_connections: parse_env("DB_POOL_MAX", defaults.max_connections)?,
            connection_timeout_seconds: defaults.connection_timeout_seconds,
            request_timeout_seconds: defaults.request_timeout_seconds,
        })
    }

    /// Server and database this configuration points at, without credentials
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1433,
            database: "master".to_string(),
            username: "sa".to_string(),
            password: String::new(),
            encrypt: true,
            trust_server_certificate: true,
            min_connections: 0,
            max_connections: 10,
            connection_timeout_seconds: 60,
            request_timeout_seconds: 30,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{} has an invalid value: {}", name, raw))),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(e.into()),
    }
}

impl CacheConfig {
    /// Create a new cache configuration
    pub fn new(default_ttl_seconds: u64, sweep_interval_seconds: u64) -> Self {
        Self {
            default_ttl_seconds,
            sweep_interval_seconds,
        }
    }

    /// Get TTL as Duration
    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 300,
            sweep_interval_seconds: 60,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Delay to wait after the given failed attempt (1-based), doubling each time
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(32);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
        }
    }
}

impl MetricsConfig {
    pub fn new(capacity: usize, slow_threshold_ms: u64) -> Self {
        Self {
            capacity,
            slow_threshold_ms,
        }
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            slow_threshold_ms: 1000,
        }
    }
}
