//! # sea-orm-query-telemetry
//!
//! Composable metrics and tracing middleware for SeaORM query execution.
//!
//! Every query issued through a [`TracedConnection`] passes through a chain of
//! layers built once from configuration:
//!
//! 1. **stats**: measures the call through a [`MethodRecorder`] (metrics).
//! 2. **trace**: opens a span through a [`MethodTracer`] (only when a tracer
//!    is configured).
//! 3. **wrap_rows**: wraps the result set so iteration and close are traced
//!    (only when row tracing is enabled).
//!
//! Errors returned by the driver reach the caller unchanged. In particular
//! [`QueryError::Skip`] passes every layer verbatim, so callers can fall back
//! to a different driver path.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sea_orm::Database;
//! use sea_orm_query_telemetry::TracedConnection;
//!
//! // Wrap your existing connection
//! let db = Database::connect("postgres://localhost/mydb").await?;
//! let traced_db = TracedConnection::from(db);
//!
//! // Use it exactly like a normal DatabaseConnection
//! let users = Users::find().all(&traced_db).await?;
//! ```
//!
//! ## Custom Labels
//!
//! Labels attached to a [`CallContext`] are added to the metrics and spans of
//! queries issued with that context:
//!
//! ```rust,ignore
//! use sea_orm_query_telemetry::{with_custom_attributes, CallContext, KeyValue};
//!
//! let ctx = with_custom_attributes(&CallContext::new(), [KeyValue::new("tenant", "acme")]);
//! let rows = traced_db.query_all_with_context(ctx, stmt).await?;
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! use sea_orm_query_telemetry::{TracedConnection, TracingConfig};
//!
//! let config = TracingConfig::default()
//!     .with_statement_logging(true)  // Include SQL in spans (default: false for security)
//!     .with_parameter_logging(false) // Include query parameters (default: false)
//!     .with_rows_tracing(false, true) // Trace result set close with row counts
//!     .with_slow_query_threshold(Duration::from_millis(100));
//!
//! let traced_db = TracedConnection::new(db, config);
//! ```
//!
//! ## Telemetry
//!
//! | Signal | Name | Labels / fields |
//! |--------|------|-----------------|
//! | histogram | `db_sql_client_latency_seconds` | `db_method`, `db_sql_status`, custom labels |
//! | counter | `db_sql_client_calls_total` | `db_method`, `db_sql_status`, custom labels |
//! | span | `db.query` | `otel.name`, `db.system`, `db.name`, `db.statement`, `db.attributes`, `otel.status_code`, `error.message` |

mod config;
mod connection;
mod context;
mod driver;
mod error;
mod middleware;
mod query;
mod recorder;
mod rows;
mod telemetry;
mod tracer;

#[cfg(test)]
mod testing;

pub use config::TracingConfig;
pub use connection::{TracedConnection, TracingExt};
pub use context::{attributes, with_custom_attributes, CallContext, KeyValue, LabelValue};
pub use driver::{drain_rows, first_row, named_values, NamedValue, QueryOutcome, Rows, VecRows};
pub use error::QueryError;
pub use middleware::{
    chain_query_middlewares, NopQuery, QueryContext, QueryContextFn, QueryMiddleware, SkippedQuery,
};
pub use query::{
    make_queryer_middlewares, QueryConfig, QueryStats, QueryTrace, QueryWrapRows,
    METRIC_METHOD_QUERY, TRACE_METHOD_QUERY,
};
pub use recorder::MetricsRecorder;
pub use rows::{wrap_rows, TracedRows};
pub use telemetry::{
    trace_args_only, trace_nothing, trace_query_with_args, trace_query_without_args,
    MethodRecorder, MethodTracer, QueryTracer, RecordEnd, TraceEnd,
};
pub use tracer::SpanTracer;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        with_custom_attributes, CallContext, KeyValue, TracedConnection, TracingConfig, TracingExt,
    };
}
