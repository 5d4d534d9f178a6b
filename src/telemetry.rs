//! Telemetry capabilities consumed by the query layers.

use std::sync::Arc;

use crate::context::{CallContext, KeyValue};
use crate::driver::NamedValue;
use crate::error::QueryError;

/// Finalizer returned by [`MethodRecorder::record`].
pub type RecordEnd = Box<dyn FnOnce(Option<&QueryError>) + Send>;

/// Finalizer returned by [`MethodTracer::trace`]. Receives the outcome and the
/// labels to attach to the span.
pub type TraceEnd = Box<dyn FnOnce(Option<&QueryError>, &[KeyValue]) + Send>;

/// Derives extra span labels from the query text and its arguments.
pub type QueryTracer = Arc<dyn Fn(&CallContext, &str, &[NamedValue]) -> Vec<KeyValue> + Send + Sync>;

/// Starts a measurement for a driver method.
pub trait MethodRecorder: Send + Sync {
    fn record(&self, ctx: &CallContext, method: &str, labels: &[KeyValue]) -> RecordEnd;
}

/// Starts spans for driver methods.
pub trait MethodTracer: Send + Sync {
    /// Begins a span; the returned context carries it to nested layers.
    fn trace(&self, ctx: CallContext, method: &str) -> (CallContext, TraceEnd);

    /// Whether tracing is active for `ctx`. `None` when the tracer cannot tell.
    fn should_trace(&self, ctx: &CallContext) -> Option<bool>;
}

/// Label carrying the query text.
pub const STATEMENT_LABEL: &str = "db.statement";

/// Prefix of the labels carrying bound arguments.
pub const ARGS_LABEL_PREFIX: &str = "db.sql.args.";

/// Reports the query text only.
pub fn trace_query_without_args() -> QueryTracer {
    Arc::new(|_ctx: &CallContext, query: &str, _args: &[NamedValue]| {
        vec![KeyValue::new(STATEMENT_LABEL, query.to_string())]
    })
}

/// Reports the query text and every bound argument.
///
/// Arguments often carry user input; only enable this where that is acceptable.
pub fn trace_query_with_args() -> QueryTracer {
    Arc::new(|_ctx: &CallContext, query: &str, args: &[NamedValue]| {
        let mut labels = Vec::with_capacity(args.len() + 1);
        labels.push(KeyValue::new(STATEMENT_LABEL, query.to_string()));
        labels.extend(arg_labels(args));
        labels
    })
}

/// Reports the bound arguments without the query text.
pub fn trace_args_only() -> QueryTracer {
    Arc::new(|_ctx: &CallContext, _query: &str, args: &[NamedValue]| {
        arg_labels(args).collect()
    })
}

fn arg_labels(args: &[NamedValue]) -> impl Iterator<Item = KeyValue> + '_ {
    args.iter().map(|arg| {
        KeyValue::new(
            format!("{ARGS_LABEL_PREFIX}{}", arg.label()),
            format!("{:?}", arg.value),
        )
    })
}

/// Reports nothing.
pub fn trace_nothing() -> QueryTracer {
    Arc::new(|_ctx: &CallContext, _query: &str, _args: &[NamedValue]| Vec::new())
}
