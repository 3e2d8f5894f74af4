//! Environment-driven configuration.
//!
//! Values come from the process environment, optionally seeded from a
//! `.env` file with [`load_dotenv`].

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::http::{BodyParserOptions, CookieParserOptions, FormParserOptions, UploadOptions};

/// Loads `.env` from the working directory if present.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(String),
    Invalid { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing environment variable {}", key),
            ConfigError::Invalid { key, value } => {
                write!(f, "invalid value for {}: {:?}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

pub fn get_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key.to_string()))
}

pub fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn get_env_parsed<T: FromStr>(key: &str) -> Result<T, ConfigError> {
    let value = get_env(key)?;
    value.parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value,
    })
}

/// Parses `key` if set, falling back to `default` when it is absent.
pub fn get_env_parsed_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match get_env_parsed(key) {
        Err(ConfigError::Missing(_)) => Ok(default),
        other => other,
    }
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest request body read from the connection.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_body_size: 16 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Reads `TRELLIS_HOST`, `TRELLIS_PORT` and `TRELLIS_MAX_BODY_SIZE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: get_env_or("TRELLIS_HOST", &defaults.host),
            port: get_env_parsed_or("TRELLIS_PORT", defaults.port)?,
            max_body_size: get_env_parsed_or("TRELLIS_MAX_BODY_SIZE", defaults.max_body_size)?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = self.addr();
        addr.parse().map_err(|_| ConfigError::Invalid {
            key: "TRELLIS_HOST".to_string(),
            value: addr,
        })
    }
}

/// Defaults for the request parsers the route builder installs.
#[derive(Debug, Clone, Default)]
pub struct ParserConfig {
    pub body: BodyParserOptions,
    pub cookies: CookieParserOptions,
    pub forms: FormParserOptions,
    pub uploads: UploadOptions,
}

impl ParserConfig {
    /// Reads `TRELLIS_BODY_LIMIT`, `TRELLIS_COOKIE_DECODE`,
    /// `TRELLIS_UPLOAD_FILE_SIZE_LIMIT` and `TRELLIS_UPLOAD_FILES_LIMIT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let body_limit = get_env_parsed_or("TRELLIS_BODY_LIMIT", defaults.body.limit)?;
        Ok(Self {
            body: defaults.body.with_limit(body_limit),
            cookies: CookieParserOptions {
                decode: get_env_parsed_or("TRELLIS_COOKIE_DECODE", defaults.cookies.decode)?,
            },
            forms: FormParserOptions { limit: body_limit },
            uploads: UploadOptions {
                file_size_limit: get_env_parsed_or(
                    "TRELLIS_UPLOAD_FILE_SIZE_LIMIT",
                    defaults.uploads.file_size_limit,
                )?,
                files_limit: get_env_parsed_or(
                    "TRELLIS_UPLOAD_FILES_LIMIT",
                    defaults.uploads.files_limit,
                )?,
            },
        })
    }
}
