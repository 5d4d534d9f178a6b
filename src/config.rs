//! Configuration for query instrumentation.

use std::fmt;
use std::time::Duration;

use crate::telemetry::{
    trace_args_only, trace_nothing, trace_query_with_args, trace_query_without_args, QueryTracer,
};

/// Driver-level options for query instrumentation.
///
/// # Example
///
/// ```rust
/// use sea_orm_query_telemetry::TracingConfig;
/// use std::time::Duration;
///
/// let config = TracingConfig::default()
///     .with_statement_logging(true)
///     .with_rows_tracing(true, true)
///     .with_slow_query_threshold(Duration::from_millis(100));
/// ```
#[derive(Clone)]
pub struct TracingConfig {
    /// Whether to include the SQL statement in spans.
    /// Default: `false` (for security - prevents accidental credential logging)
    pub log_statements: bool,

    /// Whether to include query parameters in spans.
    /// Default: `false` (parameters may contain sensitive data)
    pub log_parameters: bool,

    /// Threshold for logging slow queries at WARN level.
    /// Default: 500ms
    pub slow_query_threshold: Duration,

    /// Custom database name to include in spans (useful for multi-database setups).
    /// Default: `None`
    pub database_name: Option<String>,

    /// Whether spans are created at all. When `false` only metrics are recorded.
    /// Default: `true`
    pub span_tracing: bool,

    /// Trace every advance of a result set.
    /// Default: `false`
    pub trace_rows_next: bool,

    /// Trace the close of a result set, with the number of rows read.
    /// Default: `false`
    pub trace_rows_close: bool,

    /// Custom derivation of span labels from the query and its arguments.
    /// Overrides `log_statements` / `log_parameters` when set.
    pub query_tracer: Option<QueryTracer>,
}

impl fmt::Debug for TracingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingConfig")
            .field("log_statements", &self.log_statements)
            .field("log_parameters", &self.log_parameters)
            .field("slow_query_threshold", &self.slow_query_threshold)
            .field("database_name", &self.database_name)
            .field("span_tracing", &self.span_tracing)
            .field("trace_rows_next", &self.trace_rows_next)
            .field("trace_rows_close", &self.trace_rows_close)
            .field("query_tracer", &self.query_tracer.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_statements: false,
            log_parameters: false,
            slow_query_threshold: Duration::from_millis(500),
            database_name: None,
            span_tracing: true,
            trace_rows_next: false,
            trace_rows_close: false,
            query_tracer: None,
        }
    }
}

impl TracingConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable SQL statement logging in spans.
    ///
    /// **Security Warning**: Enabling this may expose sensitive data in your traces
    /// if your queries contain credentials or PII in the SQL text itself.
    pub fn with_statement_logging(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    /// Enable or disable parameter logging in spans.
    ///
    /// **Security Warning**: Query parameters often contain user input and
    /// potentially sensitive data. Only enable in development or controlled environments.
    pub fn with_parameter_logging(mut self, enabled: bool) -> Self {
        self.log_parameters = enabled;
        self
    }

    /// Set the threshold for slow query warnings.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    /// Set a database name to include in spans.
    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = Some(name.into());
        self
    }

    /// Enable or disable span creation.
    pub fn with_span_tracing(mut self, enabled: bool) -> Self {
        self.span_tracing = enabled;
        self
    }

    /// Enable tracing of result set iteration (`next`) and release (`close`).
    pub fn with_rows_tracing(mut self, next: bool, close: bool) -> Self {
        self.trace_rows_next = next;
        self.trace_rows_close = close;
        self
    }

    /// Use a custom function to derive span labels from queries.
    pub fn with_query_tracer(mut self, tracer: QueryTracer) -> Self {
        self.query_tracer = Some(tracer);
        self
    }

    /// The label derivation in effect for these options.
    pub fn query_tracer(&self) -> QueryTracer {
        if let Some(tracer) = &self.query_tracer {
            return tracer.clone();
        }

        match (self.log_statements, self.log_parameters) {
            (true, true) => trace_query_with_args(),
            (true, false) => trace_query_without_args(),
            (false, true) => trace_args_only(),
            (false, false) => trace_nothing(),
        }
    }

    /// Create a development-friendly configuration with full logging enabled.
    ///
    /// **Warning**: Do not use in production as it logs all SQL and parameters.
    pub fn development() -> Self {
        Self {
            log_statements: true,
            log_parameters: true,
            slow_query_threshold: Duration::from_millis(100),
            trace_rows_next: true,
            trace_rows_close: true,
            ..Self::default()
        }
    }

    /// Create a production-safe configuration with minimal overhead.
    pub fn production() -> Self {
        Self {
            slow_query_threshold: Duration::from_secs(1),
            ..Self::default()
        }
    }
}
