//! Runtime configuration, read from the environment (and `.env`).

use std::env;
use std::fmt;

use chrono::Duration;
use dotenv::dotenv;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8088";
const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;
const DEFAULT_POOL_SIZE: u32 = 10;
/// HS256 keys shorter than the digest size are rejected.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub pool_size: u32,
    pub auth: AuthConfig,
}

/// Token signing material. The secret has no default.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>, token_ttl: Duration) -> Result<Self, ConfigError> {
        let jwt_secret = jwt_secret.into();
        if jwt_secret.trim().is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                message: format!("must be at least {} bytes", MIN_SECRET_LEN),
            });
        }
        Ok(AuthConfig {
            jwt_secret,
            token_ttl,
        })
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let ttl_days = match lookup("TOKEN_TTL_DAYS") {
            Some(raw) => parse_positive("TOKEN_TTL_DAYS", &raw)?,
            None => DEFAULT_TOKEN_TTL_DAYS,
        };
        let pool_size = match lookup("DB_POOL_SIZE") {
            Some(raw) => parse_positive("DB_POOL_SIZE", &raw)? as u32,
            None => DEFAULT_POOL_SIZE,
        };

        Ok(Config {
            database_url,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            pool_size,
            auth: AuthConfig::new(jwt_secret, Duration::days(ttl_days))?,
        })
    }
}

/// `DATABASE_URL` alone, for the operator tools that never sign tokens.
pub fn database_url() -> Result<String, ConfigError> {
    dotenv().ok();
    env::var("DATABASE_URL")
        .ok()
        .filter(|url| !url.is_empty())
        .ok_or(ConfigError::Missing("DATABASE_URL"))
}

fn parse_positive(key: &'static str, raw: &str) -> Result<i64, ConfigError> {
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 && value <= i64::from(u32::MAX) => Ok(value),
        _ => Err(ConfigError::Invalid {
            key,
            message: format!("expected a positive integer, got {:?}", raw),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/drawntorun"),
            ("JWT_SECRET", SECRET),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8088");
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.auth.token_ttl, Duration::days(7));
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/x")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn short_secret_is_an_error() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/x"),
            ("JWT_SECRET", "too-short"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JWT_SECRET", .. }));
    }

    #[test]
    fn bad_ttl_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/x"),
            ("JWT_SECRET", SECRET),
            ("TOKEN_TTL_DAYS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "TOKEN_TTL_DAYS", .. }));
    }

    #[test]
    fn debug_hides_secret() {
        let auth = AuthConfig::new(SECRET, Duration::days(1)).unwrap();
        assert!(!format!("{:?}", auth).contains(SECRET));
    }
}
