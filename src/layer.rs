use crate::handler::ClickHouseHandler;
use crate::record::{Attr, LogRecord, Source, Value};
use chrono::Utc;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::Notify;
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Targets whose events are never persisted: this crate's own
/// diagnostics and the HTTP stack used to perform the inserts.
const IGNORED_TARGETS: [&str; 5] = [env!("CARGO_CRATE_NAME"), "hyper", "reqwest", "h2", "rustls"];

/// `tracing_subscriber` layer that hands every enabled event to a
/// [`ClickHouseHandler`].
///
/// Fields of enclosing spans are bound to the handler with `with_attrs`
/// before the event is handled; with [`with_span_groups`] each span name
/// also opens a group. Each event is inserted by its own task on the
/// current Tokio runtime; nothing is queued or retried.
///
/// Those tasks are detached: inserts still running when the runtime shuts
/// down are lost. Await [`PendingInserts::wait`] (from [`pending`]) before
/// leaving `main` to let them finish.
///
/// [`with_span_groups`]: ClickHouseLayer::with_span_groups
/// [`pending`]: ClickHouseLayer::pending
pub struct ClickHouseLayer {
    handler: ClickHouseHandler,
    span_groups: bool,
    pending: PendingInserts,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events whose insert returned an error or could not be started.
    pub failed_events: Arc<AtomicU64>,
}

impl ClickHouseLayer {
    pub fn new(handler: ClickHouseHandler) -> Self {
        ClickHouseLayer {
            handler,
            span_groups: false,
            pending: PendingInserts::default(),
            total_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Nest span fields and event fields under the names of the enclosing
    /// spans (`outer.inner.key`).
    pub fn with_span_groups(mut self, span_groups: bool) -> Self {
        self.span_groups = span_groups;
        self
    }

    /// Handle on the inserts this layer has started and not yet finished.
    pub fn pending(&self) -> PendingInserts {
        self.pending.clone()
    }
}

/// Count of in-flight inserts of a [`ClickHouseLayer`].
#[derive(Clone, Debug, Default)]
pub struct PendingInserts {
    inner: Arc<PendingInner>,
}

#[derive(Debug, Default)]
struct PendingInner {
    count: AtomicU64,
    idle: Notify,
}

impl PendingInserts {
    pub fn len(&self) -> u64 {
        self.inner.count.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve once no insert is in flight. Inserts started while waiting
    /// are waited for as well.
    pub async fn wait(&self) {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            // Register before checking so a wake-up between the check and
            // the await is not missed.
            idle.as_mut().enable();
            if self.is_empty() {
                return;
            }
            idle.await;
        }
    }

    fn start(&self) -> InFlight {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        InFlight(self.clone())
    }
}

/// Marks one insert as in flight until dropped.
struct InFlight(PendingInserts);

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.inner.idle.notify_waiters();
        }
    }
}

/// Fields recorded on a span, kept in the span's extensions.
struct SpanFields(Vec<Attr>);

fn is_ignored(target: &str) -> bool {
    IGNORED_TARGETS.iter().any(|prefix| {
        target == *prefix
            || target
                .strip_prefix(prefix)
                .map_or(false, |rest| rest.starts_with("::"))
    })
}

impl<S> Layer<S> for ClickHouseLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut fields = Vec::new();
        let mut message = None;
        attrs.record(&mut FieldVisitor { attrs: &mut fields, message: &mut message });
        if let Some(message) = message {
            fields.push(Attr::new("message", message));
        }
        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
            let mut message = None;
            values.record(&mut FieldVisitor { attrs: &mut *fields, message: &mut message });
            if let Some(message) = message {
                fields.push(Attr::new("message", message));
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if is_ignored(meta.target()) || !self.handler.enabled(*meta.level()) {
            return;
        }

        let mut handler = self.handler.clone();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if self.span_groups {
                    handler = handler.with_group(span.name());
                }
                if let Some(SpanFields(fields)) = span.extensions().get::<SpanFields>() {
                    if !fields.is_empty() {
                        handler = handler.with_attrs(fields.iter().cloned());
                    }
                }
            }
        }

        let mut attrs = Vec::new();
        let mut message: Option<String> = None;
        event.record(&mut FieldVisitor { attrs: &mut attrs, message: &mut message });

        let source = match (meta.file(), meta.line()) {
            (Some(file), Some(line)) => Some(Source {
                file: file.to_string(),
                line,
                function: meta.module_path().unwrap_or_else(|| meta.target()).to_string(),
            }),
            _ => None,
        };

        let record = LogRecord {
            timestamp: Utc::now(),
            level: *meta.level(),
            message: message.unwrap_or_default(),
            attrs,
            source,
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                self.failed_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("no tokio runtime, dropping log record");
                return;
            }
        };

        let failed = Arc::clone(&self.failed_events);
        let in_flight = self.pending.start();
        runtime.spawn(async move {
            let _in_flight = in_flight;
            if let Err(e) = handler.handle(&record).await {
                failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "failed to persist log record");
            }
        });
    }
}

use tracing::field::{Field, Visit};

/// Collects event or span fields as [`Attr`]s; the `message` field is
/// kept apart.
pub struct FieldVisitor<'a> {
    pub attrs: &'a mut Vec<Attr>,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn push(&mut self, field: &Field, value: Value) {
        self.attrs.push(Attr { key: field.name().to_string(), value });
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.push(field, Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Value::U64(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::F64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, Value::Str(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.push(field, Value::Debug(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn own_and_http_targets_are_ignored() {
        assert!(is_ignored("clickhouse_log_sink"));
        assert!(is_ignored("clickhouse_log_sink::handler"));
        assert!(is_ignored("hyper::proto::h1"));
        assert!(is_ignored("reqwest::connect"));
        assert!(!is_ignored("hyperion"));
        assert!(!is_ignored("my_app::orders"));
    }

    #[tokio::test]
    async fn wait_returns_at_once_when_idle() {
        let pending = PendingInserts::default();
        pending.wait().await;
        assert!(pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_covers_every_in_flight_insert() {
        let pending = PendingInserts::default();
        for ms in [10, 50] {
            let in_flight = pending.start();
            tokio::spawn(async move {
                let _in_flight = in_flight;
                tokio::time::sleep(Duration::from_millis(ms)).await;
            });
        }
        assert_eq!(pending.len(), 2);

        let started = tokio::time::Instant::now();
        pending.wait().await;
        assert!(pending.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
