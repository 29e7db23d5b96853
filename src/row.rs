use crate::config::Settings;
use crate::converter::Payload;
use crate::db::{Param, Statement};
use crate::record::Level;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Keys (compared lower-cased) that carry the user identifier, highest
/// priority first.
pub const UID_ALIASES: [&str; 3] = ["uid", "user_id", "userid"];

/// Keys (compared lower-cased) that carry the request identifier, highest
/// priority first.
pub const REQUEST_ID_ALIASES: [&str; 3] = ["rid", "request_id", "requestid"];

/// Column order of the destination table.
pub const COLUMNS: [&str; 9] = [
    "timestamp",
    "hostname",
    "namespace",
    "service",
    "level",
    "message",
    "attributes",
    "uid",
    "request_id",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// One row of the log table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub namespace: String,
    pub service: String,
    pub level: String,
    pub message: String,
    pub attributes: BTreeMap<String, String>,
    pub uid: String,
    pub request_id: String,
}

/// Identifier picked from the payload, remembering which alias it came
/// from so a higher-priority alias can replace it.
#[derive(Default)]
struct Extracted {
    rank: Option<usize>,
    value: String,
}

impl Extracted {
    fn offer(&mut self, rank: usize, value: String) {
        if self.rank.map_or(true, |current| rank < current) {
            self.rank = Some(rank);
            self.value = value;
        }
    }
}

fn alias_rank(aliases: &[&str], lower_key: &str) -> Option<usize> {
    aliases.iter().position(|alias| *alias == lower_key)
}

impl Row {
    /// Turn a converted payload into a row.
    ///
    /// Identifier aliases are matched case-insensitively and removed from
    /// the attributes. When several aliases of the same identifier are
    /// present, the one listed first in [`UID_ALIASES`] /
    /// [`REQUEST_ID_ALIASES`] wins; spellings of the same alias keep the
    /// first occurrence.
    pub fn build(
        timestamp: DateTime<Utc>,
        level: Level,
        message: &str,
        settings: &Settings,
        payload: Payload,
    ) -> Row {
        let mut uid = Extracted::default();
        let mut request_id = Extracted::default();
        let mut attributes = BTreeMap::new();

        for (key, value) in payload {
            let lower = key.to_lowercase();
            if let Some(rank) = alias_rank(&UID_ALIASES, &lower) {
                uid.offer(rank, value.to_text());
                continue;
            }
            if let Some(rank) = alias_rank(&REQUEST_ID_ALIASES, &lower) {
                request_id.offer(rank, value.to_text());
                continue;
            }
            attributes.insert(key, value.to_text());
        }

        Row {
            timestamp,
            hostname: settings.hostname.clone(),
            namespace: settings.namespace.clone(),
            service: settings.service.clone(),
            level: level.to_string(),
            message: message.to_string(),
            attributes,
            uid: uid.value,
            request_id: request_id.value,
        }
    }

    /// Build the insert for `table`. Every column, the attributes map
    /// included, is a bound parameter; only the table name is part of the
    /// statement text.
    pub fn insert_statement(&self, table: &str) -> Statement {
        let params = vec![
            Param {
                name: "timestamp",
                kind: "DateTime64(9, 'UTC')",
                value: self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            },
            Param::string("hostname", &self.hostname),
            Param::string("namespace", &self.namespace),
            Param::string("service", &self.service),
            Param::string("level", &self.level),
            Param::string("message", &self.message),
            Param {
                name: "attributes",
                kind: "Map(String, String)",
                value: map_literal(&self.attributes),
            },
            Param::string("uid", &self.uid),
            Param::string("request_id", &self.request_id),
        ];

        let placeholders: Vec<String> = params.iter().map(Param::placeholder).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            COLUMNS.join(", "),
            placeholders.join(", "),
        );

        Statement { sql, params }
    }
}

/// Render `attrs` in the ClickHouse text format of `Map(String, String)`,
/// `{'k1':'v1','k2':'v2'}`. An empty map renders as `{}`.
pub fn map_literal(attrs: &BTreeMap<String, String>) -> String {
    let mut out = String::from("{");
    for (i, (key, value)) in attrs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_quoted(&mut out, key);
        out.push(':');
        push_quoted(&mut out, value);
    }
    out.push('}');
    out
}

/// Append `s` as a single-quoted ClickHouse string literal.
pub fn push_quoted(out: &mut String, s: &str) {
    out.push('\'');
    push_escaped(out, s);
    out.push('\'');
}

/// Append `s` with backslash, quote and control characters escaped the
/// way ClickHouse reads both quoted literals and TSV-escaped text.
pub fn push_escaped(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            c if c.is_control() && (c as u32) < 0x80 => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_settings;
    use crate::record::Value;

    fn payload(pairs: &[(&str, Value)]) -> Payload {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn build(pairs: &[(&str, Value)]) -> Row {
        Row::build(Utc::now(), Level::ERROR, "msg", &test_settings(), payload(pairs))
    }

    #[test]
    fn identifiers_are_extracted_case_insensitively() {
        let row = build(&[
            ("UserID", Value::I64(7)),
            ("RequestId", Value::from("r-1")),
            ("other", Value::from("x")),
        ]);
        assert_eq!(row.uid, "7");
        assert_eq!(row.request_id, "r-1");
        assert_eq!(row.attributes.len(), 1);
        assert_eq!(row.attributes["other"], "x");
        assert!(!row.attributes.contains_key("UserID"));
    }

    #[test]
    fn higher_priority_alias_wins_regardless_of_order() {
        let row = build(&[
            ("userid", Value::from("third")),
            ("user_id", Value::from("second")),
            ("uid", Value::from("first")),
            ("requestid", Value::from("r3")),
            ("rid", Value::from("r1")),
        ]);
        assert_eq!(row.uid, "first");
        assert_eq!(row.request_id, "r1");
        assert!(row.attributes.is_empty());
    }

    #[test]
    fn same_alias_in_two_spellings_keeps_first() {
        let row = build(&[("UID", Value::from("a")), ("uid", Value::from("b"))]);
        assert_eq!(row.uid, "a");
    }

    #[test]
    fn grouped_identifier_keys_are_plain_attributes() {
        let row = build(&[("req.uid", Value::from("u"))]);
        assert_eq!(row.uid, "");
        assert_eq!(row.attributes["req.uid"], "u");
    }

    #[test]
    fn row_carries_identity_from_settings() {
        let row = build(&[]);
        assert_eq!(row.hostname, "test-host");
        assert_eq!(row.namespace, "test-ns");
        assert_eq!(row.service, "test-svc");
        assert_eq!(row.level, "ERROR");
        assert_eq!(row.message, "msg");
    }

    #[test]
    fn empty_map_literal() {
        assert_eq!(map_literal(&BTreeMap::new()), "{}");
    }

    #[test]
    fn map_literal_sorts_keys() {
        let mut m = BTreeMap::new();
        m.insert("b".to_string(), "2".to_string());
        m.insert("a".to_string(), "1".to_string());
        assert_eq!(map_literal(&m), "{'a':'1','b':'2'}");
    }

    #[test]
    fn map_literal_escapes_quotes_and_controls() {
        let mut m = BTreeMap::new();
        m.insert("it's".to_string(), "a\\b'); DROP TABLE logs; --\n\u{1}".to_string());
        assert_eq!(
            map_literal(&m),
            "{'it\\'s':'a\\\\b\\'); DROP TABLE logs; --\\n\\x01'}"
        );
    }

    #[test]
    fn statement_binds_every_column() {
        let row = build(&[("uid", Value::I64(1)), ("k", Value::from("v'); --"))]);
        let stmt = row.insert_statement("logging.logs");

        assert_eq!(
            stmt.sql,
            "INSERT INTO logging.logs (timestamp, hostname, namespace, service, level, message, attributes, uid, request_id) \
             VALUES ({timestamp:DateTime64(9, 'UTC')}, {hostname:String}, {namespace:String}, {service:String}, \
             {level:String}, {message:String}, {attributes:Map(String, String)}, {uid:String}, {request_id:String})"
        );
        assert!(!stmt.sql.contains("v\\'); --"));
        assert_eq!(stmt.params.len(), COLUMNS.len());
        assert_eq!(stmt.param("attributes"), Some("{'k':'v\\'); --'}"));
        assert_eq!(stmt.param("uid"), Some("1"));
        assert_eq!(stmt.param("request_id"), Some(""));
        assert_eq!(stmt.param("level"), Some("ERROR"));
    }

    #[test]
    fn placeholders_follow_column_order() {
        let stmt = build(&[]).insert_statement("logs");
        let names: Vec<_> = stmt.params.iter().map(|p| p.name).collect();
        assert_eq!(names, COLUMNS);
        for param in &stmt.params {
            assert!(stmt.sql.contains(&param.placeholder()), "{} missing", param.name);
        }
    }

    #[test]
    fn timestamp_param_has_nanosecond_precision() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:20:30.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let row = Row::build(ts, Level::INFO, "m", &test_settings(), Payload::new());
        let stmt = row.insert_statement("logs");
        assert_eq!(stmt.param("timestamp"), Some("2024-05-01 10:20:30.123456789"));
    }
}
