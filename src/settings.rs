//! Runtime configuration read from the environment.
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use log::{debug, warn};
use thiserror::Error;

use crate::request_log::{DEFAULT_CAPACITY, OverflowPolicy};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB_NAME: &str = "app";
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Connection variables of a networked database. SQLite ignores them.
const UNUSED_DB_VARS: &[&str] = &["DB_HOST", "DB_PORT", "DB_USER", "DB_PASSWORD", "DB_SSLMODE"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value `{value}` for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub frontend_url: String,
    pub bcrypt_cost: u32,
    pub log_dir: PathBuf,
    pub request_log_capacity: usize,
    pub request_log_policy: OverflowPolicy,
}

impl Settings {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenv::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) if is_missing_env_file(&e) => debug!("No .env file, using the process environment"),
            Err(e) => warn!("Could not load .env: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        for &key in UNUSED_DB_VARS {
            if get(key).is_some() {
                warn!("{} is set but has no effect with the SQLite backend", key);
            }
        }

        let environment = get("APP_ENV")
            .or_else(|| get("GO_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let database_url = match get("DATABASE_URL") {
            Some(url) => url,
            None => {
                let name = get("DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
                format!("sqlite://{}.db", name)
            }
        };

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let frontend_url = get("FRONTEND_URL").unwrap_or_else(|| {
            warn!(
                "FRONTEND_URL not set, allowing CORS from {}",
                DEFAULT_FRONTEND_URL
            );
            DEFAULT_FRONTEND_URL.to_string()
        });

        let request_log_policy = match get("REQUEST_LOG_OVERFLOW") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "REQUEST_LOG_OVERFLOW",
                value: raw,
            })?,
            None => OverflowPolicy::default(),
        };

        let bcrypt_cost = parse_or("BCRYPT_COST", get("BCRYPT_COST"), DEFAULT_BCRYPT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
            });
        }

        Ok(Settings {
            environment,
            host: get("APP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or("APP_PORT", get("APP_PORT"), DEFAULT_PORT)?,
            database_url,
            jwt_secret,
            frontend_url,
            bcrypt_cost,
            log_dir: PathBuf::from(get("LOG_DIR").unwrap_or_else(|| "logs".to_string())),
            request_log_capacity: parse_or(
                "REQUEST_LOG_CAPACITY",
                get("REQUEST_LOG_CAPACITY"),
                DEFAULT_CAPACITY,
            )?,
            request_log_policy,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// `host:port` for the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Whether a `.env` load failed only because there was no file to read.
pub fn is_missing_env_file(error: &dotenv::Error) -> bool {
    matches!(error, dotenv::Error::Io(e) if e.kind() == io::ErrorKind::NotFound)
}

fn parse_or<T: FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
