//! Environment variable names understood by [`HandlerOptions::from_env`]
//! and [`ClickHouseConfig::from_env`].
//!
//! [`HandlerOptions::from_env`]: crate::config::HandlerOptions::from_env
//! [`ClickHouseConfig::from_env`]: crate::clickhouse::ClickHouseConfig::from_env

use crate::error::ConfigError;
use std::str::FromStr;

/// Host name override; discovered from the OS when unset.
pub const LOG_SINK_HOSTNAME_ENV: &str = "LOG_SINK_HOSTNAME";

/// Namespace written to every row.
pub const LOG_SINK_NAMESPACE_ENV: &str = "LOG_SINK_NAMESPACE";

/// Service name written to every row.
pub const LOG_SINK_SERVICE_ENV: &str = "LOG_SINK_SERVICE";

/// Destination table, optionally database-qualified (`logging.logs`).
pub const LOG_SINK_TABLE_ENV: &str = "LOG_SINK_TABLE";

/// Minimum level persisted (`trace`, `debug`, `info`, `warn`, `error`).
pub const LOG_SINK_LEVEL_ENV: &str = "LOG_SINK_LEVEL";

/// Per-insert timeout in seconds.
pub const LOG_SINK_TIMEOUT_SECS_ENV: &str = "LOG_SINK_TIMEOUT_SECS";

/// `true` to add the call site to every row's attributes.
pub const LOG_SINK_ADD_SOURCE_ENV: &str = "LOG_SINK_ADD_SOURCE";

/// ClickHouse base HTTP URL, e.g. `http://127.0.0.1:8123`.
pub const LOG_SINK_CLICKHOUSE_URL_ENV: &str = "LOG_SINK_CLICKHOUSE_URL";

/// ClickHouse database name.
pub const LOG_SINK_CLICKHOUSE_DB_ENV: &str = "LOG_SINK_CLICKHOUSE_DB";

/// Optional ClickHouse user name.
pub const LOG_SINK_CLICKHOUSE_USER_ENV: &str = "LOG_SINK_CLICKHOUSE_USER";

/// Optional ClickHouse password.
pub const LOG_SINK_CLICKHOUSE_PASSWORD_ENV: &str = "LOG_SINK_CLICKHOUSE_PASSWORD";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating unset and empty the same.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read and parse an environment variable if it is set.
pub fn env_parse<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env_opt(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
    }
}
