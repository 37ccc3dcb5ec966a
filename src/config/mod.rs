/// Configuration management for the MEL admin utility
///
/// Resolves the database driver and connection target, the bind address used by
/// `serve`, logging and statement limits from the process environment.

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// Connection string for the primary store
pub const DATABASE_URL: &str = "DATABASE_URL";
/// Optional driver selector ("postgres" or "sqlite")
pub const DATABASE_TYPE: &str = "DATABASE_TYPE";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_LOG_LEVEL: &str = "warn";
const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;

/// Name of the local database file created under the data directory
pub const LOCAL_DATABASE_FILE: &str = "mel.db";

/// Errors raised while resolving configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_TYPE is set to {0:?} but DATABASE_URL is not set")]
    MissingUrl(String),
    #[error("unsupported DATABASE_TYPE {0:?} (expected \"postgres\" or \"sqlite\")")]
    UnknownDriver(String),
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration used when handing off to `serve`
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Maximum level emitted by the log subscriber
    pub log_level: String,
    /// Upper bound on a single statement or row fetch
    pub statement_timeout: Duration,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "127.0.0.1")
    pub host: String,
}

/// Which store to open, and where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// Remote PostgreSQL server addressed by a connection string
    Postgres { url: String },
    /// SQLite database named by a connection string
    /// (`sqlite:path`, `sqlite://path?mode=rwc`, `sqlite::memory:` or a bare path)
    Sqlite { url: String },
    /// Default local database file, used when nothing is configured
    LocalFile { path: PathBuf },
}

impl DatabaseConfig {
    /// Resolve the driver from `DATABASE_URL` / `DATABASE_TYPE`
    ///
    /// - both set: the named driver with the given URL
    /// - only the URL set: PostgreSQL
    /// - neither set: a SQLite file under `data_dir`
    /// - only the type set: rejected
    ///
    /// Empty values count as unset.
    pub fn resolve(
        url: Option<String>,
        driver: Option<String>,
        data_dir: &str,
    ) -> Result<Self, ConfigError> {
        let url = url.filter(|u| !u.trim().is_empty());
        let driver = driver.filter(|d| !d.trim().is_empty());

        match (url, driver) {
            (Some(url), Some(driver)) => match driver.trim().to_ascii_lowercase().as_str() {
                "postgres" | "postgresql" => Ok(Self::Postgres { url }),
                "sqlite" | "sqlite3" => Ok(Self::Sqlite { url }),
                _ => Err(ConfigError::UnknownDriver(driver)),
            },
            (Some(url), None) => Ok(Self::Postgres { url }),
            (None, Some(driver)) => Err(ConfigError::MissingUrl(driver)),
            (None, None) => Ok(Self::LocalFile {
                path: PathBuf::from(data_dir).join(LOCAL_DATABASE_FILE),
            }),
        }
    }

    /// Short driver name for log lines
    pub fn driver_name(&self) -> &'static str {
        match self {
            Self::Postgres { .. } => "postgres",
            Self::Sqlite { .. } | Self::LocalFile { .. } => "sqlite",
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("MEL_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let database =
            DatabaseConfig::resolve(lookup(DATABASE_URL), lookup(DATABASE_TYPE), &data_dir)?;

        let log_level =
            lookup("MEL_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        if log_level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::InvalidValue {
                name: "MEL_LOG_LEVEL",
                value: log_level,
                reason: "expected one of error, warn, info, debug, trace".to_string(),
            });
        }

        let statement_timeout = match lookup("MEL_STATEMENT_TIMEOUT_SECS") {
            None => Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "MEL_STATEMENT_TIMEOUT_SECS",
                        value: raw,
                        reason: "expected a positive number of seconds".to_string(),
                    })
                }
            },
        };

        Ok(Self {
            server: ServerConfig {
                host: lookup("MEL_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            },
            database,
            log_level,
            statement_timeout,
        })
    }
}
