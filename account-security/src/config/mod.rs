//! Environment-driven configuration.

use serde::Deserialize;
use std::env;

use crate::error::SecurityError;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    /// Session time-to-live. Fixed default of 24 hours, overridable here.
    pub session_ttl_hours: i64,
    /// Lockout duration used when a policy sets a threshold but no
    /// duration of its own.
    pub default_lockout_minutes: i64,
    /// Interval for the background expiry sweeper.
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl SecurityConfig {
    pub fn from_env() -> Result<Self, SecurityError> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str.parse().map_err(SecurityError::Config)?;
        let is_prod = environment == Environment::Prod;

        let config = SecurityConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("account-security"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env(
                    "DATABASE_URL",
                    Some("postgres://localhost/account_security"),
                    is_prod,
                )?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
            },
            session_ttl_hours: parse_env("SESSION_TTL_HOURS", "24", is_prod)?,
            default_lockout_minutes: parse_env("DEFAULT_LOCKOUT_MINUTES", "30", is_prod)?,
            sweep_interval_seconds: parse_env("SWEEP_INTERVAL_SECONDS", "300", is_prod)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SecurityError> {
        if self.session_ttl_hours <= 0 {
            return Err(SecurityError::Config(
                "SESSION_TTL_HOURS must be positive".to_string(),
            ));
        }
        if self.default_lockout_minutes <= 0 {
            return Err(SecurityError::Config(
                "DEFAULT_LOCKOUT_MINUTES must be positive".to_string(),
            ));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(SecurityError::Config(
                "SWEEP_INTERVAL_SECONDS must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SecurityConfig {
    /// Embedded-use defaults; production deployments load from the
    /// environment instead.
    fn default() -> Self {
        Self {
            environment: Environment::Dev,
            service_name: "account-security".to_string(),
            log_level: "info".to_string(),
            database: DatabaseConfig {
                url: "postgres://localhost/account_security".to_string(),
                max_connections: 10,
            },
            session_ttl_hours: 24,
            default_lockout_minutes: 30,
            sweep_interval_seconds: 300,
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, SecurityError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(SecurityError::Config(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(SecurityError::Config(format!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, SecurityError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| SecurityError::Config(format!("{}: {}", key, e)))
}
