use crate::record::{Attr, LogRecord, Value};
use crate::state::BoundAttr;
use indexmap::IndexMap;
use std::sync::Arc;

/// Separator placed between group names and the attribute key.
pub const GROUP_SEPARATOR: &str = ".";

/// Group under which the call site is added when `add_source` is set.
pub const SOURCE_KEY: &str = "source";

/// Flattened attributes of one record: unique keys, insertion ordered.
pub type Payload = IndexMap<String, Value>;

/// Per-attribute rewrite hook. Receives the group path of the attribute
/// and the attribute itself; returning `None` drops it.
pub type ReplaceAttr = Arc<dyn Fn(&[String], Attr) -> Option<Attr> + Send + Sync>;

/// Strategy turning bound state plus an incoming record into a [`Payload`].
///
/// Any function or closure with the matching signature is a converter;
/// [`default_converter`] is used when none is configured.
pub trait Converter: Send + Sync {
    fn convert(
        &self,
        add_source: bool,
        replace_attr: Option<&ReplaceAttr>,
        bound: &[BoundAttr],
        groups: &[String],
        record: &LogRecord,
    ) -> Payload;
}

impl<F> Converter for F
where
    F: Fn(bool, Option<&ReplaceAttr>, &[BoundAttr], &[String], &LogRecord) -> Payload + Send + Sync,
{
    fn convert(
        &self,
        add_source: bool,
        replace_attr: Option<&ReplaceAttr>,
        bound: &[BoundAttr],
        groups: &[String],
        record: &LogRecord,
    ) -> Payload {
        self(add_source, replace_attr, bound, groups, record)
    }
}

/// Flatten bound attributes, then record attributes, then the optional
/// call site into one payload. Keys are prefixed with their group path
/// joined by [`GROUP_SEPARATOR`]; a later key overwrites an earlier one.
pub fn default_converter(
    add_source: bool,
    replace_attr: Option<&ReplaceAttr>,
    bound: &[BoundAttr],
    groups: &[String],
    record: &LogRecord,
) -> Payload {
    let mut payload = Payload::with_capacity(bound.len() + record.attrs.len());

    for b in bound {
        insert(&mut payload, replace_attr, &b.groups, b.attr.clone());
    }

    for attr in &record.attrs {
        insert(&mut payload, replace_attr, groups, attr.clone());
    }

    if add_source {
        if let Some(source) = &record.source {
            let source_group = [SOURCE_KEY.to_string()];
            let attrs = [
                Attr::new("function", source.function.as_str()),
                Attr::new("file", source.file.as_str()),
                Attr::new("line", source.line),
            ];
            for attr in attrs {
                insert(&mut payload, replace_attr, &source_group, attr);
            }
        }
    }

    payload
}

fn insert(payload: &mut Payload, replace_attr: Option<&ReplaceAttr>, groups: &[String], attr: Attr) {
    let attr = match replace_attr {
        Some(replace) => match replace(groups, attr) {
            Some(attr) => attr,
            None => return,
        },
        None => attr,
    };

    if attr.key.is_empty() {
        return;
    }

    payload.insert(group_key(groups, &attr.key), attr.value);
}

/// Join a group path and a key with [`GROUP_SEPARATOR`].
pub fn group_key(groups: &[String], key: &str) -> String {
    if groups.is_empty() {
        return key.to_string();
    }
    let mut out = groups.join(GROUP_SEPARATOR);
    out.push_str(GROUP_SEPARATOR);
    out.push_str(key);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Level, Source};
    use crate::state::HandlerState;

    fn convert(state: &HandlerState, record: &LogRecord) -> Payload {
        default_converter(false, None, state.attrs(), state.groups(), record)
    }

    #[test]
    fn bound_then_record_attrs_in_order() {
        let state = HandlerState::new().with_attrs([Attr::new("svc", "auth")]);
        let record = LogRecord::new(Level::INFO, "m").with_attr("k", 1).with_attr("j", 2);

        let payload = convert(&state, &record);
        let keys: Vec<_> = payload.keys().map(String::as_str).collect();
        assert_eq!(keys, ["svc", "k", "j"]);
    }

    #[test]
    fn groups_prefix_keys() {
        let state = HandlerState::new()
            .with_group("a")
            .with_attrs([Attr::new("bound", true)])
            .with_group("b");
        let record = LogRecord::new(Level::INFO, "m").with_attr("k", "v");

        let payload = convert(&state, &record);
        assert_eq!(payload.get("a.bound"), Some(&Value::Bool(true)));
        assert_eq!(payload.get("a.b.k"), Some(&Value::from("v")));

        let path: Vec<_> = "a.b.k".split(GROUP_SEPARATOR).collect();
        assert_eq!(&path[..path.len() - 1], ["a", "b"]);
    }

    #[test]
    fn record_attr_wins_over_bound_on_collision() {
        let state = HandlerState::new().with_attrs([Attr::new("k", "bound")]);
        let record = LogRecord::new(Level::INFO, "m").with_attr("k", "record");

        let payload = convert(&state, &record);
        assert_eq!(payload.len(), 1);
        assert_eq!(payload["k"], Value::from("record"));
    }

    #[test]
    fn replace_attr_can_rewrite_and_drop() {
        let hook: ReplaceAttr = Arc::new(|groups: &[String], mut attr: Attr| {
            if attr.key == "password" {
                return None;
            }
            if groups.is_empty() && attr.key == "user" {
                attr.value = Value::from("redacted");
            }
            Some(attr)
        });
        let record = LogRecord::new(Level::WARN, "login")
            .with_attr("user", "bob")
            .with_attr("password", "hunter2");

        let payload = default_converter(false, Some(&hook), &[], &[], &record);
        assert_eq!(payload.get("user"), Some(&Value::from("redacted")));
        assert!(!payload.contains_key("password"));
    }

    #[test]
    fn rewrite_to_duplicate_key_keeps_last_value() {
        let hook: ReplaceAttr = Arc::new(|_: &[String], attr: Attr| Some(Attr::new("same", attr.value)));
        let record = LogRecord::new(Level::INFO, "m").with_attr("a", 1).with_attr("b", 2);

        let payload = default_converter(false, Some(&hook), &[], &[], &record);
        assert_eq!(payload.len(), 1);
        assert_eq!(payload["same"], Value::I64(2));
    }

    #[test]
    fn empty_keys_are_dropped() {
        let record = LogRecord::new(Level::INFO, "m").with_attr("", "x");
        assert!(default_converter(false, None, &[], &[], &record).is_empty());
    }

    #[test]
    fn source_added_only_when_requested() {
        let record = LogRecord::new(Level::INFO, "m").with_source(Source {
            file: "src/main.rs".into(),
            line: 42,
            function: "app::run".into(),
        });

        let without = default_converter(false, None, &[], &[], &record);
        assert!(without.is_empty());

        let with = default_converter(true, None, &[], &["ignored".to_string()], &record);
        assert_eq!(with.get("source.file"), Some(&Value::from("src/main.rs")));
        assert_eq!(with.get("source.line"), Some(&Value::U64(42)));
        assert_eq!(with.get("source.function"), Some(&Value::from("app::run")));
    }

    #[test]
    fn closures_are_converters() {
        let custom = |_: bool, _: Option<&ReplaceAttr>, _: &[BoundAttr], _: &[String], r: &LogRecord| {
            let mut p = Payload::new();
            p.insert("msg_len".to_string(), Value::U64(r.message.len() as u64));
            p
        };
        let converter: Arc<dyn Converter> = Arc::new(custom);
        let payload = converter.convert(false, None, &[], &[], &LogRecord::new(Level::INFO, "four"));
        assert_eq!(payload["msg_len"], Value::U64(4));
    }
}
