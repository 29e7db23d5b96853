use crate::converter::{default_converter, Converter, ReplaceAttr};
use crate::db::Database;
use crate::env::{
    env_opt, env_parse, LOG_SINK_ADD_SOURCE_ENV, LOG_SINK_HOSTNAME_ENV, LOG_SINK_LEVEL_ENV,
    LOG_SINK_NAMESPACE_ENV, LOG_SINK_SERVICE_ENV, LOG_SINK_TABLE_ENV, LOG_SINK_TIMEOUT_SECS_ENV,
};
use crate::error::ConfigError;
use crate::handler::ClickHouseHandler;
use crate::record::Level;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Per-insert timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// User-facing options for building a [`ClickHouseHandler`].
///
/// Every field is optional here; [`HandlerOptions::build`] fills in
/// defaults and rejects anything that is still missing.
///
/// **Fields**
/// - `hostname`: emitting host; discovered from the OS when `None`.
/// - `namespace`, `service`: required identity columns.
/// - `level`: minimum level persisted; `TRACE` when `None`.
/// - `table`: required destination, `table` or `database.table`.
/// - `timeout`: budget for each insert; 60 seconds when `None`.
/// - `converter`: flattening strategy; [`default_converter`] when `None`.
/// - `add_source`: add `source.*` call-site attributes.
/// - `replace_attr`: optional per-attribute rewrite hook.
/// - `db`: required handle the inserts are executed on.
#[derive(Clone, Default)]
pub struct HandlerOptions {
    pub hostname: Option<String>,
    pub namespace: String,
    pub service: String,
    pub level: Option<Level>,
    pub table: String,
    pub timeout: Option<Duration>,
    pub converter: Option<Arc<dyn Converter>>,
    pub add_source: bool,
    pub replace_attr: Option<ReplaceAttr>,
    pub db: Option<Arc<dyn Database>>,
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("hostname", &self.hostname)
            .field("namespace", &self.namespace)
            .field("service", &self.service)
            .field("level", &self.level)
            .field("table", &self.table)
            .field("timeout", &self.timeout)
            .field("converter", &self.converter.is_some())
            .field("add_source", &self.add_source)
            .field("replace_attr", &self.replace_attr.is_some())
            .field("db", &self.db.is_some())
            .finish()
    }
}

impl HandlerOptions {
    /// Options with the identity and table filled in; everything else at
    /// its default.
    pub fn new(
        namespace: impl Into<String>,
        service: impl Into<String>,
        table: impl Into<String>,
        db: Arc<dyn Database>,
    ) -> Self {
        HandlerOptions {
            namespace: namespace.into(),
            service: service.into(),
            table: table.into(),
            db: Some(db),
            ..Default::default()
        }
    }

    /// Read options from the `LOG_SINK_*` environment variables (see
    /// [`crate::env`]). The database handle is supplied by the caller.
    pub fn from_env(db: Arc<dyn Database>) -> Result<Self, ConfigError> {
        Ok(HandlerOptions {
            hostname: env_opt(LOG_SINK_HOSTNAME_ENV),
            namespace: env_opt(LOG_SINK_NAMESPACE_ENV).unwrap_or_default(),
            service: env_opt(LOG_SINK_SERVICE_ENV).unwrap_or_default(),
            level: env_parse(LOG_SINK_LEVEL_ENV)?,
            table: env_opt(LOG_SINK_TABLE_ENV).unwrap_or_default(),
            timeout: env_parse::<u64>(LOG_SINK_TIMEOUT_SECS_ENV)?.map(Duration::from_secs),
            converter: None,
            add_source: env_parse(LOG_SINK_ADD_SOURCE_ENV)?.unwrap_or(false),
            replace_attr: None,
            db: Some(db),
        })
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_add_source(mut self, add_source: bool) -> Self {
        self.add_source = add_source;
        self
    }

    pub fn with_replace_attr(mut self, replace_attr: ReplaceAttr) -> Self {
        self.replace_attr = Some(replace_attr);
        self
    }

    /// Validate, apply defaults and produce a ready handler.
    pub fn build(self) -> Result<ClickHouseHandler, ConfigError> {
        Ok(ClickHouseHandler::new(self.into_settings()?))
    }

    fn into_settings(self) -> Result<Settings, ConfigError> {
        let hostname = match self.hostname.filter(|h| !h.is_empty()) {
            Some(h) => h,
            None => hostname::get()
                .map_err(ConfigError::Hostname)?
                .to_string_lossy()
                .into_owned(),
        };
        if hostname.is_empty() {
            return Err(ConfigError::Hostname(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "empty hostname",
            )));
        }

        let db = self.db.ok_or(ConfigError::MissingDatabase)?;
        if self.namespace.is_empty() {
            return Err(ConfigError::MissingNamespace);
        }
        if self.service.is_empty() {
            return Err(ConfigError::MissingService);
        }
        if self.table.is_empty() {
            return Err(ConfigError::MissingTable);
        }
        if !is_table_identifier(&self.table) {
            return Err(ConfigError::InvalidTable(self.table));
        }

        Ok(Settings {
            hostname,
            namespace: self.namespace,
            service: self.service,
            level: self.level.unwrap_or(Level::TRACE),
            table: self.table,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            converter: match self.converter {
                Some(converter) => converter,
                None => Arc::new(default_converter),
            },
            add_source: self.add_source,
            replace_attr: self.replace_attr,
            db,
        })
    }
}

/// `table` or `database.table`, each part a plain identifier.
fn is_table_identifier(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Validated configuration shared by a handler and everything derived
/// from it.
pub struct Settings {
    pub hostname: String,
    pub namespace: String,
    pub service: String,
    pub level: Level,
    pub table: String,
    pub timeout: Duration,
    pub converter: Arc<dyn Converter>,
    pub add_source: bool,
    pub replace_attr: Option<ReplaceAttr>,
    pub db: Arc<dyn Database>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("hostname", &self.hostname)
            .field("namespace", &self.namespace)
            .field("service", &self.service)
            .field("level", &self.level)
            .field("table", &self.table)
            .field("timeout", &self.timeout)
            .field("add_source", &self.add_source)
            .finish_non_exhaustive()
    }
}
