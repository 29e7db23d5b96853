use crate::db::DbError;
use std::time::Duration;

/// Error returned when [`HandlerOptions`] cannot produce a handler.
///
/// [`HandlerOptions`]: crate::config::HandlerOptions
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing namespace for logging")]
    MissingNamespace,

    #[error("missing service name for logging")]
    MissingService,

    #[error("missing log table name")]
    MissingTable,

    #[error("invalid log table name {0:?}: expected `table` or `database.table`")]
    InvalidTable(String),

    #[error("missing database handle")]
    MissingDatabase,

    #[error("cannot determine hostname: {0}")]
    Hostname(#[source] std::io::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Error returned by [`ClickHouseHandler::handle`] for a single record.
///
/// [`ClickHouseHandler::handle`]: crate::handler::ClickHouseHandler::handle
#[derive(thiserror::Error, Debug)]
pub enum HandleError {
    #[error("log insert failed: {0}")]
    Database(#[source] DbError),

    #[error("log insert timed out after {0:?}")]
    Timeout(Duration),
}
