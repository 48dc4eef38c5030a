//! # Configuration Management
//!
//! Hierarchical configuration for the erasure orchestration engine, loaded from:
//!
//! 1. **Environment variables** (highest precedence)
//! 2. **Environment-specific YAML** (`config/{environment}.yaml`)
//! 3. **Default YAML** (`config/default.yaml`) (lowest precedence)
//!
//! ```rust,ignore
//! use erasure_core::Config;
//! let config = Config::load().expect("failed to load configuration");
//! ```

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub security: SecurityConfig,
    pub erasure: ErasureConfig,
    pub metrics: MetricsConfig,
    pub app: AppConfig,
}

/// PostgreSQL connection and pool settings for the reference KV store adapter.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Redis connection settings for the reference event bus adapter.
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Signing key material and evidence-at-rest settings.
///
/// `signing_key_seed` is 32 raw bytes, hex-encoded, used to derive the
/// Ed25519 signing key for Certificates of Destruction (§4.B/§4.M).
#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    pub signing_key_seed: String,
}

/// Tunables for the step executor, background scanner, and zombie scheduler.
#[derive(Debug, Deserialize, Clone)]
pub struct ErasureConfig {
    /// Per-adapter invocation timeout, in seconds.
    pub adapter_timeout_seconds: u64,
    /// Max attempts before a step is marked Failed.
    pub max_attempts: u32,
    /// Base delay for the exponential backoff, in seconds.
    pub retry_initial_delay_seconds: u64,
    /// Multiplier applied per attempt: `initial * multiplier^(attempts-1)`.
    pub retry_backoff_multiplier: u64,
    /// Hard ceiling on any single retry delay, in seconds.
    pub retry_max_delay_seconds: u64,
    /// Number of items a background scan processes per chunk before checkpointing.
    pub scan_chunk_size: u32,
    /// How often the legal-hold and zombie sweepers tick, in seconds.
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub namespace: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from `config/default.yaml`, `config/{ENVIRONMENT}.yaml`,
    /// then environment variables prefixed `ERASURE_`, in that order of precedence.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(Environment::with_prefix("ERASURE").separator("_"));

        let config = builder.build()?;
        let mut loaded_config: Config = config.try_deserialize()?;
        loaded_config.validate(&environment)?;

        Ok(loaded_config)
    }

    fn validate(&mut self, environment: &str) -> Result<(), ConfigError> {
        if self.security.signing_key_seed.len() != 64 {
            return Err(ConfigError::Message(format!(
                "signing_key_seed must be 64 hex characters (32 bytes), got {} characters",
                self.security.signing_key_seed.len()
            )));
        }

        if !self.database.url.starts_with("postgresql://") {
            return Err(ConfigError::Message(
                "database.url must be a PostgreSQL connection string starting with 'postgresql://'".to_string(),
            ));
        }

        if !self.redis.url.starts_with("redis://") {
            return Err(ConfigError::Message(
                "redis.url must be a Redis connection string starting with 'redis://'".to_string(),
            ));
        }

        if self.erasure.max_attempts == 0 {
            return Err(ConfigError::Message("erasure.max_attempts must be at least 1".to_string()));
        }

        if environment == "production" {
            self.validate_production_security()?;
        }

        Ok(())
    }

    /// Fails fast on placeholder values that indicate a missing environment variable.
    fn validate_production_security(&self) -> Result<(), ConfigError> {
        let error_indicators = [
            "ERROR_", "INSECURE_DEFAULT", "CHANGE_THIS", "NOT_SET", "CHECK_ENVIRONMENT", "PLACEHOLDER",
        ];

        for indicator in &error_indicators {
            if self.security.signing_key_seed.contains(indicator) {
                return Err(ConfigError::Message(format!(
                    "Production deployment detected an insecure signing key seed. Set ERASURE_SECURITY_SIGNING_KEY_SEED. Current value contains: {}",
                    indicator
                )));
            }
            if self.database.url.contains(indicator) {
                return Err(ConfigError::Message(format!(
                    "Production deployment detected missing database configuration. Set ERASURE_DATABASE_URL. Current value contains: {}",
                    indicator
                )));
            }
            if self.redis.url.contains(indicator) {
                return Err(ConfigError::Message(format!(
                    "Production deployment detected missing Redis configuration. Set ERASURE_REDIS_URL. Current value contains: {}",
                    indicator
                )));
            }
        }

        Ok(())
    }
}
