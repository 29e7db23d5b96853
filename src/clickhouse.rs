use crate::db::{Database, DbError, Statement};
use crate::env::{
    env_opt, env_or, LOG_SINK_CLICKHOUSE_DB_ENV, LOG_SINK_CLICKHOUSE_PASSWORD_ENV,
    LOG_SINK_CLICKHOUSE_URL_ENV, LOG_SINK_CLICKHOUSE_USER_ENV,
};
use crate::row::{push_escaped, COLUMNS};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Connection settings for [`ClickHouseClient`].
///
/// The client talks to ClickHouse over its HTTP interface. Statement
/// placeholders are sent as `param_<name>` query parameters, so values
/// never become part of the statement text.
#[derive(Clone, Debug)]
pub struct ClickHouseConfig {
    /// Base URL without query, e.g. "http://127.0.0.1:8123"
    pub url: String,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Longest request URI sent, parameters included. Must not exceed the
    /// server's `http_max_uri_size` (1 MiB by default); longer inserts are
    /// rejected locally.
    pub max_uri_size: usize,
}

/// Server default of `http_max_uri_size`.
pub const DEFAULT_MAX_URI_SIZE: usize = 1 << 20;

impl Default for ClickHouseConfig {
    fn default() -> Self {
        ClickHouseConfig {
            url: "http://127.0.0.1:8123".to_string(),
            database: "default".to_string(),
            user: None,
            password: None,
            max_uri_size: DEFAULT_MAX_URI_SIZE,
        }
    }
}

impl ClickHouseConfig {
    /// Build a config from the `LOG_SINK_CLICKHOUSE_*` variables, falling
    /// back to [`ClickHouseConfig::default`] for URL and database.
    pub fn from_env() -> Self {
        let defaults = ClickHouseConfig::default();
        ClickHouseConfig {
            url: env_or(LOG_SINK_CLICKHOUSE_URL_ENV, &defaults.url),
            database: env_or(LOG_SINK_CLICKHOUSE_DB_ENV, &defaults.database),
            user: env_opt(LOG_SINK_CLICKHOUSE_USER_ENV),
            password: env_opt(LOG_SINK_CLICKHOUSE_PASSWORD_ENV),
            max_uri_size: defaults.max_uri_size,
        }
    }
}

/// [`Database`] implementation backed by the ClickHouse HTTP interface.
///
/// `reqwest::Client` pools connections internally, so one client can be
/// shared by every handler in the process.
///
/// Parameters travel in the URL query, so a record whose encoded values
/// exceed [`ClickHouseConfig::max_uri_size`] fails with an error instead
/// of being sent.
#[derive(Clone, Debug)]
pub struct ClickHouseClient {
    client: Client,
    config: ClickHouseConfig,
}

impl ClickHouseClient {
    /// Construct a new client using the provided configuration.
    ///
    /// **Parameters**
    /// - `config`: [`ClickHouseConfig`] describing target URL, database
    ///   and optional authentication settings.
    ///
    /// **Returns**
    /// - A ready-to-use [`ClickHouseClient`] that can be passed as the
    ///   `db` of [`HandlerOptions`](crate::config::HandlerOptions).
    pub fn new(config: ClickHouseConfig) -> Self {
        let client = Client::new();
        Self { client, config }
    }

    fn base_query(&self) -> String {
        let mut query = format!("database={}", urlencoding::encode(&self.config.database));

        if let Some(user) = &self.config.user {
            query.push_str(&format!("&user={}", urlencoding::encode(user)));
        }
        if let Some(password) = &self.config.password {
            query.push_str(&format!("&password={}", urlencoding::encode(password)));
        }

        query
    }

    fn endpoint(&self, statement: &Statement) -> Result<String, DbError> {
        let mut query = self.base_query();
        for param in &statement.params {
            query.push_str(&format!(
                "&param_{}={}",
                param.name,
                urlencoding::encode(&escape_param(&param.value))
            ));
        }
        let url = format!("{}/?{}", self.config.url.trim_end_matches('/'), query);
        if url.len() > self.config.max_uri_size {
            return Err(format!(
                "ClickHouse request URI is {} bytes, over the {} byte limit",
                url.len(),
                self.config.max_uri_size
            )
            .into());
        }
        Ok(url)
    }

    /// Check that `table` exposes every column the handler writes. This is
    /// optional and is not called automatically.
    ///
    /// **Returns**
    /// - `Ok(())` if `DESCRIBE TABLE` succeeded and listed all columns.
    /// - `Err(..)` on a non-success status or when a column is missing.
    pub async fn validate_schema(&self, table: &str) -> Result<(), DbError> {
        let url = format!(
            "{}/?{}&query={}",
            self.config.url.trim_end_matches('/'),
            self.base_query(),
            urlencoding::encode(&format!("DESCRIBE TABLE {} FORMAT JSON", table))
        );

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(format!("ClickHouse schema validation failed with status {}", resp.status()).into());
        }

        let described: Describe = serde_json::from_str(&resp.text().await?)?;
        let missing = missing_columns(&described);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("table {} is missing columns: {}", table, missing.join(", ")).into())
        }
    }
}

/// Query parameter values are read in the TSV-escaped text format.
fn escape_param(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    push_escaped(&mut out, value);
    out
}

#[derive(Deserialize)]
struct Describe {
    data: Vec<DescribeColumn>,
}

#[derive(Deserialize)]
struct DescribeColumn {
    name: String,
}

fn missing_columns(described: &Describe) -> Vec<&'static str> {
    COLUMNS
        .iter()
        .copied()
        .filter(|col| !described.data.iter().any(|c| c.name == *col))
        .collect()
}

#[async_trait]
impl Database for ClickHouseClient {
    async fn execute(&self, statement: &Statement) -> Result<(), DbError> {
        let resp = self
            .client
            .post(&self.endpoint(statement)?)
            .body(statement.sql.clone())
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(format!("ClickHouse insert failed with status {}: {}", status, text).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Param;

    fn config() -> ClickHouseConfig {
        ClickHouseConfig {
            url: "http://ch:8123/".to_string(),
            database: "logging".to_string(),
            user: Some("writer".to_string()),
            password: Some("p&ss".to_string()),
            ..ClickHouseConfig::default()
        }
    }

    fn message(text: &str) -> Statement {
        Statement {
            sql: "INSERT INTO logs VALUES ({message:String})".to_string(),
            params: vec![Param::string("message", text)],
        }
    }

    #[test]
    fn multi_line_message_is_escaped_before_encoding() {
        let url = ClickHouseClient::new(config())
            .endpoint(&message("line1\nC:\\new\tx"))
            .unwrap();
        assert_eq!(
            url,
            "http://ch:8123/?database=logging&user=writer&password=p%26ss&param_message=line1%5CnC%3A%5C%5Cnew%5Ctx"
        );

        let value = url.rsplit("param_message=").next().unwrap();
        assert_eq!(urlencoding::decode(value).unwrap(), "line1\\nC:\\\\new\\tx");
    }

    #[test]
    fn map_param_is_escaped_on_top_of_its_quoting() {
        let statement = Statement {
            sql: "INSERT INTO logs VALUES ({attributes:Map(String, String)})".to_string(),
            params: vec![Param {
                name: "attributes",
                kind: "Map(String, String)",
                value: "{'k':'it\\'s'}".to_string(),
            }],
        };
        let url = ClickHouseClient::new(config()).endpoint(&statement).unwrap();
        let value = url.rsplit("param_attributes=").next().unwrap();
        assert_eq!(urlencoding::decode(value).unwrap(), "{\\'k\\':\\'it\\\\\\'s\\'}");
    }

    #[test]
    fn oversized_uri_is_rejected_before_sending() {
        let client = ClickHouseClient::new(ClickHouseConfig { max_uri_size: 128, ..config() });
        assert!(client.endpoint(&message("short")).is_ok());

        let err = client.endpoint(&message(&"x".repeat(200))).unwrap_err();
        assert!(err.to_string().contains("128 byte limit"), "{}", err);
    }

    #[test]
    fn default_uri_limit_matches_server_default() {
        assert_eq!(ClickHouseConfig::default().max_uri_size, 1_048_576);
    }

    #[test]
    fn describe_output_is_checked_for_all_columns() {
        let json = r#"{"meta":[],"data":[
            {"name":"timestamp","type":"DateTime64(9)"},
            {"name":"hostname","type":"String"},
            {"name":"message","type":"String"}
        ],"rows":3}"#;
        let described: Describe = serde_json::from_str(json).unwrap();
        assert_eq!(
            missing_columns(&described),
            ["namespace", "service", "level", "attributes", "uid", "request_id"]
        );
    }
}
