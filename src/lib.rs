//! Structured-log handler that persists each event as one ClickHouse row.
//!
//! A [`ClickHouseHandler`] is built once from [`HandlerOptions`]; every log
//! call flows `enabled` → [`Converter`] → [`Row::build`] → [`Database::execute`].
//! The [`ClickHouseLayer`] plugs the handler into `tracing`.
//!
//! [`ClickHouseHandler`]: handler::ClickHouseHandler
//! [`HandlerOptions`]: config::HandlerOptions
//! [`Converter`]: converter::Converter
//! [`Row::build`]: row::Row::build
//! [`Database::execute`]: db::Database::execute
//! [`ClickHouseLayer`]: layer::ClickHouseLayer

pub mod record;
pub mod state;
pub mod converter;
pub mod row;
pub mod db;
pub mod config;
pub mod env;
pub mod error;
pub mod handler;
pub mod layer;

#[cfg(feature = "clickhouse")]
pub mod clickhouse;

pub mod init;
pub mod noop_db;
