//! Todo service configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! held as a `SecretString` and redacted in Debug output.

use crate::auth::jwks::{jwks_url_from_base, DEFAULT_FETCH_TIMEOUT, DEFAULT_MIN_REFRESH_INTERVAL};
use crate::auth::{KeySetOptions, VerifierOptions};
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Upper bound for `JWKS_FETCH_TIMEOUT_SECONDS`.
pub const MAX_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// Todo service configuration.
pub struct Config {
    /// PostgreSQL connection URL (`DATABASE_URL`, or `POSTGRES_URL`).
    /// `None` selects the in-memory repository.
    pub database_url: Option<SecretString>,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Base URL of the identity provider. The key set is fetched from
    /// `{auth_url}/api/auth/jwks`.
    pub auth_url: String,

    /// Expected `iss` claim, if any.
    pub auth_issuer: Option<String>,

    /// Expected `aud` claim, if any.
    pub auth_audience: Option<String>,

    /// Tolerance for `iat` in the future, in seconds.
    pub jwt_clock_skew_seconds: i64,

    /// Timeout for one key set fetch, in seconds.
    pub jwks_fetch_timeout_seconds: u64,

    /// Minimum time between key set fetch attempts, in seconds. 0 disables
    /// throttling.
    pub jwks_min_refresh_interval_seconds: u64,

    /// How long to keep serving in-flight requests after a shutdown signal.
    pub drain_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("bind_address", &self.bind_address)
            .field("auth_url", &self.auth_url)
            .field("auth_issuer", &self.auth_issuer)
            .field("auth_audience", &self.auth_audience)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("jwks_fetch_timeout_seconds", &self.jwks_fetch_timeout_seconds)
            .field(
                "jwks_min_refresh_interval_seconds",
                &self.jwks_min_refresh_interval_seconds,
            )
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid JWKS configuration: {0}")]
    InvalidJwks(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = non_empty(vars, "DATABASE_URL")
            .or_else(|| non_empty(vars, "POSTGRES_URL"))
            .map(|url| SecretString::from(url.to_string()));

        let bind_address = non_empty(vars, "BIND_ADDRESS")
            .unwrap_or(DEFAULT_BIND_ADDRESS)
            .to_string();

        let auth_url = non_empty(vars, "AUTH_URL")
            .or_else(|| non_empty(vars, "BETTER_AUTH_URL"))
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_URL".to_string()))?
            .to_string();

        let auth_issuer = non_empty(vars, "AUTH_ISSUER").map(str::to_string);
        let auth_audience = non_empty(vars, "AUTH_AUDIENCE").map(str::to_string);

        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            if value > MAX_CLOCK_SKEW.as_secs() as i64 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs() as i64
        };

        let jwks_fetch_timeout_seconds = if let Some(value_str) =
            vars.get("JWKS_FETCH_TIMEOUT_SECONDS")
        {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwks(format!(
                    "JWKS_FETCH_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 || value > MAX_JWKS_FETCH_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidJwks(format!(
                    "JWKS_FETCH_TIMEOUT_SECONDS must be between 1 and {}, got {}",
                    MAX_JWKS_FETCH_TIMEOUT_SECONDS, value
                )));
            }

            value
        } else {
            DEFAULT_FETCH_TIMEOUT.as_secs()
        };

        let jwks_min_refresh_interval_seconds = parse_u64(
            vars,
            "JWKS_MIN_REFRESH_INTERVAL_SECONDS",
            DEFAULT_MIN_REFRESH_INTERVAL.as_secs(),
        )?;

        let drain_seconds = parse_u64(vars, "DRAIN_SECONDS", 0)?;

        Ok(Config {
            database_url,
            bind_address,
            auth_url,
            auth_issuer,
            auth_audience,
            jwt_clock_skew_seconds,
            jwks_fetch_timeout_seconds,
            jwks_min_refresh_interval_seconds,
            drain_seconds,
        })
    }

    /// Full URL of the key set document.
    pub fn jwks_url(&self) -> String {
        jwks_url_from_base(&self.auth_url)
    }

    pub fn key_set_options(&self) -> KeySetOptions {
        KeySetOptions {
            fetch_timeout: Duration::from_secs(self.jwks_fetch_timeout_seconds),
            min_refresh_interval: Duration::from_secs(self.jwks_min_refresh_interval_seconds),
        }
    }

    pub fn verifier_options(&self) -> VerifierOptions {
        VerifierOptions {
            clock_skew: Duration::from_secs(self.jwt_clock_skew_seconds.unsigned_abs()),
            issuer: self.auth_issuer.clone(),
            audience: self.auth_audience.clone(),
        }
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_u64(vars: &HashMap<String, String>, name: &str, default: u64) -> Result<u64, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(value_str) => value_str.parse().map_err(|e| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("must be a non-negative integer, got '{}': {}", value_str, e),
        }),
    }
}
