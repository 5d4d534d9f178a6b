//! Query metrics backed by the `metrics` facade.
//!
//! Without an installed global recorder every call is a no-op, so the
//! instrumented connection can always carry the stats layer.

use std::time::Instant;

use metrics::Label;

use crate::context::{CallContext, KeyValue};
use crate::error::QueryError;
use crate::telemetry::{MethodRecorder, RecordEnd};

/// Latency of driver calls in seconds.
pub const LATENCY_SECONDS: &str = "db_sql_client_latency_seconds";
/// Total number of driver calls.
pub const CALLS_TOTAL: &str = "db_sql_client_calls_total";

/// Label keys
pub mod labels {
    pub const METHOD: &str = "db_method";
    pub const STATUS: &str = "db_sql_status";
}

/// Records one histogram sample and one counter increment per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }
}

impl MethodRecorder for MetricsRecorder {
    fn record(&self, _ctx: &CallContext, method: &str, attrs: &[KeyValue]) -> RecordEnd {
        let start = Instant::now();
        let mut tags = metric_labels(attrs);
        tags.push(Label::new(labels::METHOD, method.to_string()));

        Box::new(move |err: Option<&QueryError>| {
            let status = err.map_or("OK", QueryError::status);
            tags.push(Label::new(labels::STATUS, status));

            metrics::histogram!(LATENCY_SECONDS, tags.clone()).record(start.elapsed().as_secs_f64());
            metrics::counter!(CALLS_TOTAL, tags).increment(1);
        })
    }
}

/// Converts custom attributes into metric labels. Dots are not valid in
/// Prometheus label names and are replaced by underscores. Attributes that
/// would shadow `db_method` or `db_sql_status` are dropped.
fn metric_labels(attrs: &[KeyValue]) -> Vec<Label> {
    attrs
        .iter()
        .map(|kv| (kv.key.replace('.', "_"), kv))
        .filter(|(key, _)| key != labels::METHOD && key != labels::STATUS)
        .map(|(key, kv)| Label::new(key, kv.value.to_string()))
        .collect()
}
