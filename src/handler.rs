use crate::config::Settings;
use crate::error::HandleError;
use crate::record::{Attr, Level, LogRecord};
use crate::row::Row;
use crate::state::HandlerState;
use std::sync::Arc;
use tracing::{debug, trace};

/// Log handler that writes every record it is given as one ClickHouse row.
///
/// A handler is cheap to clone. [`with_attrs`](Self::with_attrs) and
/// [`with_group`](Self::with_group) return new handlers that share the
/// same settings but carry an extended [`HandlerState`]; the receiver is
/// left as it was, so one handler can be branched from many tasks.
#[derive(Clone, Debug)]
pub struct ClickHouseHandler {
    settings: Arc<Settings>,
    state: HandlerState,
}

impl ClickHouseHandler {
    pub(crate) fn new(settings: Settings) -> Self {
        ClickHouseHandler {
            settings: Arc::new(settings),
            state: HandlerState::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> &HandlerState {
        &self.state
    }

    /// Whether records at `level` are persisted.
    ///
    /// `tracing::Level` orders by verbosity (`TRACE` is the greatest), so
    /// "at least as severe as the threshold" is `level <= threshold`.
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.settings.level
    }

    /// Convert, build and insert one record.
    ///
    /// Level gating is the caller's job (see [`enabled`](Self::enabled)).
    /// Exactly one insert is attempted, bounded by the configured timeout.
    pub async fn handle(&self, record: &LogRecord) -> Result<(), HandleError> {
        let settings = &*self.settings;
        let payload = settings.converter.convert(
            settings.add_source,
            settings.replace_attr.as_ref(),
            self.state.attrs(),
            self.state.groups(),
            record,
        );
        trace!(attrs = payload.len(), "converted log record");

        let row = Row::build(record.timestamp, record.level, &record.message, settings, payload);
        self.execute(&row).await
    }

    async fn execute(&self, row: &Row) -> Result<(), HandleError> {
        let settings = &*self.settings;
        let statement = row.insert_statement(&settings.table);

        match tokio::time::timeout(settings.timeout, settings.db.execute(&statement)).await {
            Ok(Ok(())) => {
                debug!(table = %settings.table, level = %row.level, "log row inserted");
                Ok(())
            }
            Ok(Err(e)) => Err(HandleError::Database(e)),
            Err(_) => Err(HandleError::Timeout(settings.timeout)),
        }
    }

    /// Handler whose records additionally carry `attrs`, nested under the
    /// groups open on `self`.
    pub fn with_attrs(&self, attrs: impl IntoIterator<Item = Attr>) -> Self {
        ClickHouseHandler {
            settings: Arc::clone(&self.settings),
            state: self.state.with_attrs(attrs),
        }
    }

    /// Handler whose subsequent attributes are nested under `name`.
    pub fn with_group(&self, name: impl Into<String>) -> Self {
        ClickHouseHandler {
            settings: Arc::clone(&self.settings),
            state: self.state.with_group(name),
        }
    }
}
