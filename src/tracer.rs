//! Spans for driver methods, built on `tracing`.

use std::time::{Duration, Instant};

use tracing::{field, Span};

use crate::config::TracingConfig;
use crate::context::{CallContext, KeyValue, LabelValue};
use crate::error::QueryError;
use crate::rows::RETURNED_ROWS_LABEL;
use crate::telemetry::{MethodTracer, TraceEnd, STATEMENT_LABEL};

/// Creates one `db.query` span per traced method.
///
/// # Span Nesting
///
/// The span's parent is the span already carried by the [`CallContext`], or
/// the current tracing span. With tracing middleware in your web framework
/// (e.g., `tower-http`'s `TraceLayer`), database spans appear nested under
/// HTTP request spans.
#[derive(Debug, Clone)]
pub struct SpanTracer {
    db_system: &'static str,
    database_name: Option<String>,
    slow_query_threshold: Duration,
}

impl SpanTracer {
    pub fn new(config: &TracingConfig, db_system: &'static str) -> Self {
        Self {
            db_system,
            database_name: config.database_name.clone(),
            slow_query_threshold: config.slow_query_threshold,
        }
    }
}

impl MethodTracer for SpanTracer {
    fn trace(&self, ctx: CallContext, method: &str) -> (CallContext, TraceEnd) {
        let parent = ctx.span().cloned().unwrap_or_else(Span::current);

        let span = tracing::info_span!(
            parent: &parent,
            "db.query",
            otel.name = %method,
            otel.kind = "client",
            db.system = %self.db_system,
            db.name = field::Empty,
            db.statement = field::Empty,
            db.attributes = field::Empty,
            db.response.returned_rows = field::Empty,
            db.duration_ms = field::Empty,
            otel.status_code = field::Empty,
            error.message = field::Empty,
            slow_query = field::Empty,
        );

        if let Some(db_name) = &self.database_name {
            span.record("db.name", db_name.as_str());
        }

        let start = Instant::now();
        let threshold = self.slow_query_threshold;
        let end_span = span.clone();
        let end: TraceEnd = Box::new(move |err: Option<&QueryError>, labels: &[KeyValue]| {
            record_result(&end_span, err, labels, start, threshold);
        });

        (ctx.with_span(span), end)
    }

    fn should_trace(&self, ctx: &CallContext) -> Option<bool> {
        ctx.span().map(|span| !span.is_disabled())
    }
}

/// Record the outcome of a traced method in its span.
fn record_result(
    span: &Span,
    err: Option<&QueryError>,
    labels: &[KeyValue],
    start: Instant,
    threshold: Duration,
) {
    record_labels(span, labels);

    let elapsed = start.elapsed();
    let duration_ms = elapsed.as_millis() as i64;
    span.record("db.duration_ms", duration_ms);

    if elapsed > threshold {
        span.record("slow_query", true);
        let threshold_ms = threshold.as_millis() as i64;
        tracing::warn!(
            parent: span,
            duration_ms = duration_ms,
            threshold_ms = threshold_ms,
            "Slow query detected"
        );
    }

    match err {
        None => {
            span.record("otel.status_code", "OK");
        }
        Some(QueryError::Skip) => {
            tracing::debug!(parent: span, "Driver skipped instrumented path");
        }
        Some(e) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", e.to_string().as_str());
            tracing::error!(
                parent: span,
                error = %e,
                "Database query failed"
            );
        }
    }
}

/// Well-known labels land in their own span fields; the rest are collected
/// into `db.attributes` as `key=value` pairs.
fn record_labels(span: &Span, labels: &[KeyValue]) {
    let mut extra = Vec::new();

    for kv in labels {
        match &*kv.key {
            STATEMENT_LABEL | RETURNED_ROWS_LABEL => record_value(span, &kv.key, &kv.value),
            _ => extra.push(format!("{}={}", kv.key, kv.value)),
        }
    }

    if !extra.is_empty() {
        span.record("db.attributes", extra.join(",").as_str());
    }
}

fn record_value(span: &Span, key: &str, value: &LabelValue) {
    match value {
        LabelValue::Str(s) => {
            span.record(key, &**s);
        }
        LabelValue::I64(v) => {
            span.record(key, *v);
        }
        LabelValue::F64(v) => {
            span.record(key, *v);
        }
        LabelValue::Bool(v) => {
            span.record(key, *v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Capture, CapturedEvent, CapturedSpan};
    use tracing::Level;

    fn tracer() -> SpanTracer {
        SpanTracer::new(&TracingConfig::default().with_database_name("app"), "postgresql")
    }

    #[test]
    fn test_should_trace_unknown_without_span() {
        assert_eq!(tracer().should_trace(&CallContext::new()), None);
    }

    #[test]
    fn test_span_is_attached_to_context() {
        let (ctx, end) = tracer().trace(CallContext::new(), "query");
        assert!(ctx.span().is_some());
        end(None, &[KeyValue::new(STATEMENT_LABEL, "SELECT 1")]);
    }

    #[test]
    fn test_nested_trace_keeps_context_labels() {
        let base = CallContext::new().with_attributes([KeyValue::new("tenant", "acme")]);
        let (outer, outer_end) = tracer().trace(base, "query");
        let (inner, inner_end) = tracer().trace(outer.clone(), "rows_next");

        assert!(tracer().should_trace(&inner).is_some());
        assert_eq!(crate::context::attributes(&inner).len(), 1);
        inner_end(None, &[]);
        outer_end(Some(&QueryError::Skip), &[]);
    }

    fn traced(
        tracer: &SpanTracer,
        err: Option<&QueryError>,
        labels: &[KeyValue],
    ) -> (Vec<CapturedSpan>, Vec<CapturedEvent>) {
        let capture = Capture::default();
        tracing::subscriber::with_default(capture.subscriber(), || {
            let (ctx, end) = tracer.trace(CallContext::new(), "query");
            assert_eq!(tracer.should_trace(&ctx), Some(true));
            end(err, labels);
        });
        (capture.spans(), capture.events())
    }

    #[test]
    fn test_success_sets_ok_status() {
        let (spans, events) = traced(&tracer(), None, &[]);

        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "db.query");
        assert_eq!(span.field("otel.name"), Some("query"));
        assert_eq!(span.field("otel.kind"), Some("client"));
        assert_eq!(span.field("db.system"), Some("postgresql"));
        assert_eq!(span.field("db.name"), Some("app"));
        assert_eq!(span.field("otel.status_code"), Some("OK"));
        assert!(span.field("db.duration_ms").is_some());
        assert!(span.field("error.message").is_none());
        assert!(events.iter().all(|event| event.level > Level::WARN));
    }

    #[test]
    fn test_failure_sets_error_status() {
        let err = QueryError::Db(sea_orm::DbErr::Custom("boom".to_string()));
        let (spans, events) = traced(&tracer(), Some(&err), &[]);

        let span = &spans[0];
        assert_eq!(span.field("otel.status_code"), Some("ERROR"));
        assert_eq!(span.field("error.message"), Some(err.to_string().as_str()));
        assert!(events
            .iter()
            .any(|event| event.level == Level::ERROR && event.message == "Database query failed"));
    }

    #[test]
    fn test_skip_leaves_status_unset() {
        let (spans, events) = traced(&tracer(), Some(&QueryError::Skip), &[]);

        let span = &spans[0];
        assert!(span.field("otel.status_code").is_none());
        assert!(span.field("error.message").is_none());
        assert!(events.iter().all(|event| event.level != Level::ERROR));
    }

    #[test]
    fn test_slow_query_is_flagged() {
        let tracer = SpanTracer::new(
            &TracingConfig::default().with_slow_query_threshold(Duration::from_millis(1)),
            "postgresql",
        );
        let capture = Capture::default();
        tracing::subscriber::with_default(capture.subscriber(), || {
            let (_ctx, end) = tracer.trace(CallContext::new(), "query");
            std::thread::sleep(Duration::from_millis(5));
            end(None, &[]);
        });

        let spans = capture.spans();
        assert_eq!(spans[0].field("slow_query"), Some("true"));
        assert!(capture
            .events()
            .iter()
            .any(|event| event.level == Level::WARN && event.message == "Slow query detected"));
    }

    #[test]
    fn test_fast_query_is_not_flagged() {
        let (spans, _) = traced(&tracer(), None, &[]);
        assert!(spans[0].field("slow_query").is_none());
    }

    #[test]
    fn test_labels_are_mapped_to_fields() {
        let labels = [
            KeyValue::new("tenant", "acme"),
            KeyValue::new(STATEMENT_LABEL, "SELECT 1"),
            KeyValue::new("shard", 3i64),
            KeyValue::new(RETURNED_ROWS_LABEL, 3u64),
        ];
        let (spans, _) = traced(&tracer(), None, &labels);

        let span = &spans[0];
        assert_eq!(span.field("db.statement"), Some("SELECT 1"));
        assert_eq!(span.field("db.response.returned_rows"), Some("3"));
        assert_eq!(span.field("db.attributes"), Some("tenant=acme,shard=3"));
    }
}
