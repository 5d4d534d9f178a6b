//! Query middlewares: stats, trace and row wrapping.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, Span};

use crate::config::TracingConfig;
use crate::context::{attributes, CallContext};
use crate::driver::{NamedValue, QueryOutcome};
use crate::error::QueryError;
use crate::middleware::{Finalizer, QueryContext, QueryContextFn, QueryMiddleware};
use crate::rows::wrap_rows;
use crate::telemetry::{MethodRecorder, MethodTracer, QueryTracer};

pub const METRIC_METHOD_QUERY: &str = "go.sql.query";
pub const TRACE_METHOD_QUERY: &str = "query";

/// Immutable per-query-kind settings, shared by every invocation.
#[derive(Clone)]
pub struct QueryConfig {
    pub metric_method: &'static str,
    pub trace_method: &'static str,
    pub trace_query: QueryTracer,
    pub trace_rows_next: bool,
    pub trace_rows_close: bool,
}

impl QueryConfig {
    pub fn new(opts: &TracingConfig, metric_method: &'static str, trace_method: &'static str) -> Self {
        Self {
            metric_method,
            trace_method,
            trace_query: opts.query_tracer(),
            trace_rows_next: opts.trace_rows_next,
            trace_rows_close: opts.trace_rows_close,
        }
    }
}

impl std::fmt::Debug for QueryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryConfig")
            .field("metric_method", &self.metric_method)
            .field("trace_method", &self.trace_method)
            .field("trace_rows_next", &self.trace_rows_next)
            .field("trace_rows_close", &self.trace_rows_close)
            .finish_non_exhaustive()
    }
}

/// Builds the query layers, outermost first.
///
/// Stats always run. Tracing and row wrapping only exist when a tracer is
/// configured; row wrapping additionally needs one of the row tracing flags.
pub fn make_queryer_middlewares(
    recorder: Arc<dyn MethodRecorder>,
    tracer: Option<Arc<dyn MethodTracer>>,
    cfg: &QueryConfig,
) -> Vec<Arc<dyn QueryMiddleware>> {
    let mut middlewares: Vec<Arc<dyn QueryMiddleware>> = Vec::with_capacity(3);

    middlewares.push(Arc::new(QueryStats::new(recorder, cfg.metric_method)));

    let Some(tracer) = tracer else {
        return middlewares;
    };

    middlewares.push(Arc::new(QueryTrace::new(
        tracer.clone(),
        cfg.trace_query.clone(),
        cfg.trace_method,
    )));

    if cfg.trace_rows_next || cfg.trace_rows_close {
        middlewares.push(Arc::new(QueryWrapRows::new(
            tracer,
            cfg.trace_rows_next,
            cfg.trace_rows_close,
        )));
    }

    middlewares
}

/// Records metrics for a query.
pub struct QueryStats {
    recorder: Arc<dyn MethodRecorder>,
    method: &'static str,
}

impl QueryStats {
    pub fn new(recorder: Arc<dyn MethodRecorder>, method: &'static str) -> Self {
        Self { recorder, method }
    }
}

impl QueryMiddleware for QueryStats {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn wrap(&self, next: QueryContextFn) -> QueryContextFn {
        Arc::new(StatsQuery {
            recorder: self.recorder.clone(),
            method: self.method,
            next,
        })
    }
}

struct StatsQuery {
    recorder: Arc<dyn MethodRecorder>,
    method: &'static str,
    next: QueryContextFn,
}

#[async_trait]
impl QueryContext for StatsQuery {
    async fn query(&self, ctx: CallContext, query: &str, args: &[NamedValue]) -> QueryOutcome {
        let attrs = attributes(&ctx);
        let end = Finalizer::new(self.recorder.record(&ctx, self.method, &attrs));

        let result = self.next.query(ctx, query, args).await;
        end.finish(result.as_ref().err());

        result
    }
}

/// Creates a span for a query.
pub struct QueryTrace {
    tracer: Arc<dyn MethodTracer>,
    trace_query: QueryTracer,
    method: &'static str,
}

impl QueryTrace {
    pub fn new(tracer: Arc<dyn MethodTracer>, trace_query: QueryTracer, method: &'static str) -> Self {
        Self {
            tracer,
            trace_query,
            method,
        }
    }
}

impl QueryMiddleware for QueryTrace {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn wrap(&self, next: QueryContextFn) -> QueryContextFn {
        Arc::new(TraceQuery {
            tracer: self.tracer.clone(),
            trace_query: self.trace_query.clone(),
            method: self.method,
            next,
        })
    }
}

struct TraceQuery {
    tracer: Arc<dyn MethodTracer>,
    trace_query: QueryTracer,
    method: &'static str,
    next: QueryContextFn,
}

#[async_trait]
impl QueryContext for TraceQuery {
    async fn query(&self, ctx: CallContext, query: &str, args: &[NamedValue]) -> QueryOutcome {
        let ctx = ctx.with_query(query);
        let (ctx, trace_end) = self.tracer.trace(ctx, self.method);

        let label_ctx = ctx.clone();
        let trace_query = &self.trace_query;
        let end = Finalizer::new(move |err: Option<&QueryError>| {
            let mut labels = attributes(&label_ctx).to_vec();
            labels.extend(trace_query(&label_ctx, query, args));
            trace_end(err, &labels);
        });

        let span = ctx.span().cloned().unwrap_or_else(Span::none);
        let result = self.next.query(ctx, query, args).instrument(span).await;
        end.finish(result.as_ref().err());

        result
    }
}

/// Wraps successful result sets so their iteration can be traced.
pub struct QueryWrapRows {
    tracer: Arc<dyn MethodTracer>,
    trace_next: bool,
    trace_close: bool,
}

impl QueryWrapRows {
    pub fn new(tracer: Arc<dyn MethodTracer>, trace_next: bool, trace_close: bool) -> Self {
        Self {
            tracer,
            trace_next,
            trace_close,
        }
    }
}

impl QueryMiddleware for QueryWrapRows {
    fn name(&self) -> &'static str {
        "wrap_rows"
    }

    fn wrap(&self, next: QueryContextFn) -> QueryContextFn {
        Arc::new(WrapRowsQuery {
            tracer: self.tracer.clone(),
            trace_next: self.trace_next,
            trace_close: self.trace_close,
            next,
        })
    }
}

struct WrapRowsQuery {
    tracer: Arc<dyn MethodTracer>,
    trace_next: bool,
    trace_close: bool,
    next: QueryContextFn,
}

#[async_trait]
impl QueryContext for WrapRowsQuery {
    async fn query(&self, ctx: CallContext, query: &str, args: &[NamedValue]) -> QueryOutcome {
        let rows = self.next.query(ctx.clone(), query, args).await?;

        let should_trace = self.tracer.should_trace(&ctx).unwrap_or(false);

        Ok(rows.map(|rows| {
            wrap_rows(
                &ctx,
                rows,
                self.tracer.clone(),
                should_trace && self.trace_next,
                should_trace && self.trace_close,
            )
        }))
    }
}
